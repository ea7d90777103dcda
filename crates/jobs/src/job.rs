use voxedit_common::{BlockPos, Region, SessionId};
use voxedit_task::{TaskId, TaskState};

/// Sequential, user-visible job number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `Created -> Running <-> Suspended -> {Completed | Cancelled | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Created,
    Running,
    Suspended,
    Completed,
    Cancelled,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    pub(crate) fn from_task(state: TaskState) -> Self {
        match state {
            TaskState::Pending => Self::Created,
            TaskState::Running => Self::Running,
            TaskState::Suspended => Self::Suspended,
            TaskState::Completed => Self::Completed,
            TaskState::Cancelled => Self::Cancelled,
            TaskState::Failed => Self::Failed,
        }
    }
}

/// Advisory progress. Never used to decide completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    Fraction(f32),
    Indeterminate,
}

impl Progress {
    pub fn fraction(self) -> Option<f32> {
        match self {
            Self::Fraction(f) => Some(f),
            Self::Indeterminate => None,
        }
    }
}

/// Highest value reported while a job is still live.
const RUNNING_CEILING: f32 = 1.0 - f32::EPSILON;

/// Label shown by a labelled job once it completes.
pub(crate) const FINISHED_LABEL: &str = "Finished!";

/// Bookkeeping for one scheduler-managed operation.
#[derive(Debug)]
pub struct Job {
    pub(crate) id: JobId,
    pub(crate) session: SessionId,
    pub(crate) parent: Option<JobId>,
    pub(crate) children: Vec<JobId>,
    pub(crate) total_steps_hint: Option<u32>,
    pub(crate) affected_region: Option<Region>,
    pub(crate) label: String,
    /// Index of the current phase; `-1` until the first `next_step`.
    pub(crate) phase: i64,
    pub(crate) phase_fraction: f32,
    pub(crate) indeterminate: bool,
    pub(crate) progress: f32,
    pub(crate) state: JobState,
    pub(crate) cancel_requested: bool,
    pub(crate) task: Option<TaskId>,
    pub(crate) waiting_on: Option<(BlockPos, BlockPos)>,
    pub(crate) load_requested: bool,
    pub(crate) auto_retire: bool,
    pub(crate) ticks_alive: u64,
}

impl Job {
    pub(crate) fn new(
        id: JobId,
        session: SessionId,
        total_steps_hint: Option<u32>,
        affected_region: Option<Region>,
    ) -> Self {
        Self {
            id,
            session,
            parent: None,
            children: Vec::new(),
            total_steps_hint,
            affected_region,
            label: String::new(),
            phase: -1,
            phase_fraction: 0.0,
            indeterminate: false,
            progress: 0.0,
            state: JobState::Created,
            cancel_requested: false,
            task: None,
            waiting_on: None,
            load_requested: false,
            auto_retire: false,
            ticks_alive: 0,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn parent(&self) -> Option<JobId> {
        self.parent
    }

    pub fn children(&self) -> &[JobId] {
        &self.children
    }

    pub fn total_steps_hint(&self) -> Option<u32> {
        self.total_steps_hint
    }

    pub fn affected_region(&self) -> Option<&Region> {
        self.affected_region.as_ref()
    }

    /// Current phase description. Empty for jobs that never named a phase.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    /// Whether a body has been attached.
    pub fn has_body(&self) -> bool {
        self.task.is_some()
    }

    /// The area this job is parked on, if it is waiting for a load.
    pub fn waiting_on(&self) -> Option<(BlockPos, BlockPos)> {
        self.waiting_on
    }

    pub fn progress(&self) -> Progress {
        if self.indeterminate {
            Progress::Indeterminate
        } else {
            Progress::Fraction(self.progress)
        }
    }

    pub(crate) fn begin_phase(&mut self, label: String) {
        self.phase += 1;
        self.phase_fraction = 0.0;
        self.indeterminate = false;
        self.label = label;
        self.refresh_progress();
    }

    /// `fraction < 0` switches to indeterminate.
    pub(crate) fn set_fraction(&mut self, fraction: f32) {
        if fraction < 0.0 || fraction.is_nan() {
            self.indeterminate = true;
            return;
        }
        self.indeterminate = false;
        self.phase_fraction = fraction.min(1.0);
        self.refresh_progress();
    }

    fn refresh_progress(&mut self) {
        let raw = match self.total_steps_hint {
            Some(hint) if hint > 0 => {
                (self.phase.max(0) as f32 + self.phase_fraction) / hint as f32
            }
            _ => self.phase_fraction,
        };
        self.progress = self.progress.max(raw.clamp(0.0, RUNNING_CEILING));
    }

    pub(crate) fn mark_completed(&mut self) {
        self.state = JobState::Completed;
        self.indeterminate = false;
        self.progress = 1.0;
        if !self.label.is_empty() {
            self.label = FINISHED_LABEL.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(hint: Option<u32>) -> Job {
        Job::new(JobId(1), SessionId::new(), hint, None)
    }

    #[test]
    fn phases_divide_progress() {
        let mut j = job(Some(2));
        j.begin_phase("Calculating".into());
        j.set_fraction(0.5);
        assert_eq!(j.progress(), Progress::Fraction(0.25));
        j.begin_phase("Generating".into());
        assert_eq!(j.progress(), Progress::Fraction(0.5));
        j.set_fraction(1.0);
        let p = j.progress().fraction().unwrap();
        assert!(p < 1.0 && p > 0.99);
    }

    #[test]
    fn progress_never_decreases() {
        let mut j = job(None);
        j.set_fraction(0.6);
        j.set_fraction(0.2);
        assert_eq!(j.progress(), Progress::Fraction(0.6));
    }

    #[test]
    fn negative_fraction_is_indeterminate() {
        let mut j = job(Some(4));
        j.set_fraction(-1.0);
        assert_eq!(j.progress(), Progress::Indeterminate);
        j.set_fraction(0.5);
        assert_eq!(j.progress(), Progress::Fraction(0.125));
    }

    #[test]
    fn completion_reports_exactly_one() {
        let mut j = job(Some(3));
        j.begin_phase("Generating".into());
        j.mark_completed();
        assert_eq!(j.progress(), Progress::Fraction(1.0));
        assert_eq!(j.label(), FINISHED_LABEL);
        assert!(j.state().is_terminal());
    }

    #[test]
    fn unlabelled_job_stays_unlabelled() {
        let mut j = job(None);
        j.mark_completed();
        assert_eq!(j.label(), "");
    }
}
