//! Job scheduler: user-visible jobs layered over cooperative tasks.
//!
//! A job is a numbered handle for one long-running edit. Its body is driven
//! a bounded amount each host tick, reports named phases and progress, can
//! be cancelled together with the jobs it spawned, and can park until the
//! host has loaded the area it needs.
//!
//! # Invariants
//! - A job owns at most one task; its state follows that task's state.
//! - Progress never decreases while a job is live and is exactly `1` only
//!   once it has completed.
//! - Cancelling a job cancels every descendant that has not finished.
//! - A parked job asks the host for its area once and is not resumed until
//!   that area is loaded.

mod body;
mod context;
mod job;
mod report;
mod scheduler;

pub use body::{BodyError, Cancelled, JobBody, JobError, JobHandle};
pub use context::{AreaLoader, JobContext};
pub use job::{Job, JobId, JobState, Progress};
pub use scheduler::{FinishedJob, JobScheduler, PumpSummary, SchedulerError};
pub use voxedit_task::Step;
