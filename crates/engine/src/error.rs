use voxedit_common::SessionId;
use voxedit_history::HistoryError;
use voxedit_jobs::{JobId, SchedulerError};
use voxedit_kernel::WorldError;

use crate::config::ConfigError;

/// Errors surfaced to the user who issued a command.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
    #[error("job {0} belongs to another session")]
    ForeignJob(JobId),
    #[error("no region selected")]
    NoSelection,
    #[error("change limit must be -1 or positive, got {0}")]
    InvalidChangeLimit(i64),
    #[error("change limit may not exceed {max}")]
    ChangeLimitTooHigh { max: u64 },
    #[error("region of {volume} blocks is larger than the maximum of {max}")]
    RegionTooLarge { volume: u64, max: u64 },
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    World(#[from] WorldError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
