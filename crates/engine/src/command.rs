use voxedit_common::{Block, BlockPos, Region};
use voxedit_jobs::JobId;

/// A user command addressed to one session.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Undo,
    Redo,
    ClearHistory,
    /// Cancel a job of the issuing session, with its sub-jobs.
    Cancel(JobId),
    /// List the session's jobs.
    Jobs,
    /// Fill a region with `block` (`None` is air). Uses the selection when
    /// `region` is `None`.
    Set {
        region: Option<Region>,
        block: Option<Block>,
    },
    /// Swap every `from` block in a region for `to`.
    Replace {
        region: Option<Region>,
        from: Option<Block>,
        to: Option<Block>,
    },
    /// Change limit for the session; `-1` is unlimited.
    Limit(i64),
    /// Set selection corner `corner` (0 or 1).
    Select { corner: usize, pos: BlockPos },
}

impl Command {
    /// Whether the command starts an asynchronous edit.
    pub fn is_edit(&self) -> bool {
        matches!(self, Self::Set { .. } | Self::Replace { .. })
    }
}

/// What a dispatched command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    Message(String),
    /// An edit job was started; it runs over the following ticks.
    Started { job: JobId },
}

impl std::fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message(text) => f.write_str(text),
            Self::Started { job } => write!(f, "Job {job} started."),
        }
    }
}
