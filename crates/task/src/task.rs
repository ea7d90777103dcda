use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::step::{RunStep, Step, StepSource};

/// Opaque handle to a cooperative task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Task lifecycle.
///
/// `Pending -> Running <-> Suspended -> {Completed | Cancelled | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Pending,
    Running,
    Suspended,
    Completed,
    Cancelled,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Shared cancellation flag. Observed by the task at step boundaries only.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

/// What one [`CooperativeTask::resume`] call ended with.
#[derive(Debug, PartialEq, Eq)]
pub enum Resume<T, E> {
    /// Budget spent or the source yielded; more steps remain.
    Suspended,
    /// The source cannot make progress yet; the parked step is retried later.
    Parked,
    Completed(T),
    Failed(E),
    Cancelled,
    /// The task was already terminal; nothing ran.
    Finished,
}

/// Drives one step source forward a bounded amount per resume.
///
/// Steps run strictly in the order the source produces them. A step is never
/// interrupted: the budget is only compared on step boundaries, so a single
/// expensive step may overrun it.
pub struct CooperativeTask<S> {
    id: TaskId,
    source: S,
    state: TaskState,
    cancel: CancelToken,
    parked: bool,
    steps_run: u64,
    resumes: u64,
    last_slice: Duration,
}

impl<S: StepSource> CooperativeTask<S> {
    pub fn new(id: TaskId, source: S) -> Self {
        Self::with_token(id, source, CancelToken::new())
    }

    /// Create a task observing an existing cancellation token.
    pub fn with_token(id: TaskId, source: S, cancel: CancelToken) -> Self {
        Self {
            id,
            source,
            state: TaskState::Pending,
            cancel,
            parked: false,
            steps_run: 0,
            resumes: 0,
            last_slice: Duration::ZERO,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Whether the last resume ended on a parked step.
    pub fn is_parked(&self) -> bool {
        self.parked
    }

    /// Units of work executed so far (`Continue` and `Yield` steps).
    pub fn steps_run(&self) -> u64 {
        self.steps_run
    }

    pub fn resumes(&self) -> u64 {
        self.resumes
    }

    /// Time spent inside the most recent resume.
    pub fn last_slice(&self) -> Duration {
        self.last_slice
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Request cancellation. Takes effect at the next step boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run steps until the source finishes, fails, parks, yields, a
    /// cancellation is observed, or `budget` has elapsed.
    ///
    /// At least one step is drawn per resume unless the task is cancelled.
    pub fn resume<C: ?Sized>(&mut self, cx: &mut C, budget: Duration) -> Resume<S::Output, S::Error>
    where
        S: RunStep<C>,
    {
        if self.state.is_terminal() {
            return Resume::Finished;
        }
        let started = Instant::now();
        self.resumes += 1;
        self.parked = false;
        self.state = TaskState::Running;

        let outcome = loop {
            if self.cancel.is_cancelled() {
                self.source.cancelled();
                self.state = TaskState::Cancelled;
                break Resume::Cancelled;
            }
            match self.source.step(cx) {
                Err(e) => {
                    self.state = TaskState::Failed;
                    break Resume::Failed(e);
                }
                Ok(Step::Done(value)) => {
                    self.state = TaskState::Completed;
                    break Resume::Completed(value);
                }
                Ok(Step::Park) => {
                    self.parked = true;
                    self.state = TaskState::Suspended;
                    break Resume::Parked;
                }
                Ok(Step::Yield) => {
                    self.steps_run += 1;
                    self.state = TaskState::Suspended;
                    break Resume::Suspended;
                }
                Ok(Step::Continue) => {
                    self.steps_run += 1;
                    if started.elapsed() >= budget {
                        self.state = TaskState::Suspended;
                        break Resume::Suspended;
                    }
                }
            }
        };
        self.last_slice = started.elapsed();
        outcome
    }
}
