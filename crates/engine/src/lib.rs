//! Edit engine: the context object a host embeds.
//!
//! It owns the world, the per-user sessions (selection and history) and the
//! job scheduler. Commands arrive through [`EditEngine::dispatch`]; edits
//! run as jobs driven by [`EditEngine::tick`].
//!
//! # Invariants
//! - A session has at most one open record, owned by the command or job
//!   that opened it.
//! - A record whose owner ends without committing is rolled back before
//!   the tick returns; a failed command rolls back its record at once.
//! - A departed session keeps its history for a configured number of
//!   ticks and is deleted afterwards, releasing every snapshot.

mod command;
mod config;
mod edits;
mod engine;
mod error;
mod session;
mod workspace;

pub use command::{Command, CommandOutput};
pub use config::{ConfigError, EngineConfig};
pub use edits::{DEFAULT_BLOCKS_PER_STEP, FILL_PHASES, FillBody, FillMode};
pub use engine::{EditEngine, TickReport};
pub use error::EngineError;
pub use session::Session;
pub use workspace::{EditContext, EditContextExt, EditScope, Workspace};
