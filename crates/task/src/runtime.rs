use std::collections::BTreeMap;
use std::time::Duration;

use crate::budget::{TickBudget, TickTimer};
use crate::completion::{Completer, Completion, TaskError, completion};
use crate::step::{RunStep, StepSource};
use crate::task::{CooperativeTask, Resume, TaskId, TaskState};

/// Result slot type handed out by [`TaskRuntime::awaitable`].
pub type TaskCompletion<S> =
    Completion<Result<<S as StepSource>::Output, TaskError<<S as StepSource>::Error>>>;

struct Entry<S: StepSource> {
    task: CooperativeTask<S>,
    completer: Option<Completer<Result<S::Output, TaskError<S::Error>>>>,
    completion: TaskCompletion<S>,
}

/// What one [`TaskRuntime::pump`] did.
#[derive(Debug, Default)]
pub struct PumpReport {
    pub resumed: usize,
    pub finished: Vec<(TaskId, TaskState)>,
    pub elapsed: Duration,
}

/// Owns live cooperative tasks and delivers their results.
///
/// A task is destroyed as soon as it reaches a terminal state; its result
/// stays available through any [`Completion`] obtained before that.
pub struct TaskRuntime<S: StepSource> {
    next_id: u64,
    tasks: BTreeMap<TaskId, Entry<S>>,
    timer: TickTimer,
}

impl<S: StepSource> Default for TaskRuntime<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StepSource> TaskRuntime<S> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            tasks: BTreeMap::new(),
            timer: TickTimer::default(),
        }
    }

    /// Register a step source. Nothing runs until the task is resumed.
    pub fn start(&mut self, source: S) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        let (completer, completion) = completion();
        self.tasks.insert(
            id,
            Entry {
                task: CooperativeTask::new(id, source),
                completer: Some(completer),
                completion,
            },
        );
        tracing::trace!(task = %id, "task started");
        id
    }

    /// Resume one task for at most `budget`. Returns its state afterwards, or
    /// `None` if no such task is live. Terminal tasks deliver their result
    /// and are dropped.
    pub fn resume<C: ?Sized>(&mut self, id: TaskId, cx: &mut C, budget: Duration) -> Option<TaskState>
    where
        S: RunStep<C>,
    {
        let entry = self.tasks.get_mut(&id)?;
        let delivered = match entry.task.resume(cx, budget) {
            Resume::Suspended | Resume::Parked => None,
            Resume::Completed(value) => Some(Ok(value)),
            Resume::Failed(err) => Some(Err(TaskError::Failed(err))),
            Resume::Cancelled | Resume::Finished => Some(Err(TaskError::Cancelled)),
        };
        let state = entry.task.state();
        if let Some(result) = delivered {
            if let Some(completer) = entry.completer.take() {
                completer.complete(result);
            }
            self.tasks.remove(&id);
            tracing::trace!(task = %id, ?state, "task finished");
        }
        Some(state)
    }

    /// Request cancellation; observed at the task's next step boundary.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        match self.tasks.get(&id) {
            Some(entry) => {
                entry.task.cancel();
                true
            }
            None => false,
        }
    }

    /// A future resolving with the task's return value, or rejecting with
    /// [`TaskError`] on failure or cancellation.
    pub fn awaitable(&self, id: TaskId) -> Option<TaskCompletion<S>> {
        self.tasks.get(&id).map(|entry| entry.completion.clone())
    }

    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.tasks.get(&id).map(|entry| entry.task.state())
    }

    pub fn task(&self, id: TaskId) -> Option<&CooperativeTask<S>> {
        self.tasks.get(&id).map(|entry| &entry.task)
    }

    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Recent pump durations.
    pub fn timer(&self) -> &TickTimer {
        &self.timer
    }

    /// One host tick: resume every live task against the same context,
    /// splitting `budget` fairly between them.
    pub fn pump<C: ?Sized>(&mut self, cx: &mut C, budget: Duration) -> PumpReport
    where
        S: RunStep<C>,
    {
        let _span = tracing::trace_span!("task_pump", live = self.tasks.len()).entered();
        let tick = TickBudget::start(budget);
        let ids: Vec<TaskId> = self.tasks.keys().copied().collect();
        let mut report = PumpReport::default();
        for (i, id) in ids.iter().enumerate() {
            let slice = tick.slice(ids.len() - i);
            if let Some(state) = self.resume(*id, cx, slice) {
                report.resumed += 1;
                if state.is_terminal() {
                    report.finished.push((*id, state));
                }
            }
        }
        report.elapsed = tick.elapsed();
        self.timer.record(report.elapsed);
        report
    }
}
