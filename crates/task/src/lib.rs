//! Cooperative tasks: lazy step sources advanced a bounded amount per host
//! tick, on the host thread.
//!
//! # Invariants
//! - Steps of one task run strictly in production order; none is skipped
//!   or repeated, except a parked step which is retried.
//! - Budgets are checked on step boundaries only. A step is never split.
//! - Cancellation is observed before the next step is drawn, never mid-step.
//! - A task's result is delivered exactly once, then the task is dropped.

mod budget;
mod completion;
mod runtime;
mod step;
mod task;

pub use budget::{DEFAULT_TIME_BUDGET, TickBudget, TickTimer};
pub use completion::{Completer, Completion, TaskError, completion};
pub use runtime::{PumpReport, TaskCompletion, TaskRuntime};
pub use step::{FromFn, IterSteps, RunStep, Step, StepSource, from_fn, from_iter};
pub use task::{CancelToken, CooperativeTask, Resume, TaskId, TaskState};
