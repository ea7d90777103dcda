//! The job scheduler: edit-domain bookkeeping over the cooperative task runtime.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use voxedit_common::{Region, SessionId};
use voxedit_task::{
    DEFAULT_TIME_BUDGET, Step, TaskCompletion, TaskError, TaskRuntime, TickBudget, TickTimer,
};

use crate::body::{BodyError, Deliver, FnBody, JobBody, JobError, JobHandle, JobTask, typed_delivery};
use crate::context::{AreaLoader, JobContext, Spawned, Spawner};
use crate::job::{Job, JobId, JobState};
use crate::report;

/// Errors from scheduler operations addressed by job id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("no job with id {0}")]
    UnknownJob(JobId),
    #[error("job {0} already has a body attached")]
    AlreadyAttached(JobId),
    #[error("job {0} has already finished")]
    AlreadyFinished(JobId),
}

/// A job that reached a terminal state during a pump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedJob {
    pub id: JobId,
    pub session: SessionId,
    pub state: JobState,
    /// Failure message, for `Failed` jobs.
    pub error: Option<String>,
}

/// What one [`JobScheduler::pump`] did.
#[derive(Debug, Default)]
pub struct PumpSummary {
    pub resumed: usize,
    /// Jobs skipped because the area they wait on is not loaded yet.
    pub waiting: usize,
    pub finished: Vec<FinishedJob>,
    pub elapsed: Duration,
}

/// Runtime-side state of a job with an attached body.
struct Attached<W: AreaLoader> {
    outcome: TaskCompletion<JobTask<W>>,
    deliver: Option<Deliver>,
}

/// Runs jobs for every session from the host tick.
pub struct JobScheduler<W: AreaLoader> {
    jobs: BTreeMap<JobId, Job>,
    attached: BTreeMap<JobId, Attached<W>>,
    runtime: TaskRuntime<JobTask<W>>,
    spawner: Spawner<W>,
    budget: Duration,
    timer: TickTimer,
}

impl<W: AreaLoader> Default for JobScheduler<W> {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_BUDGET)
    }
}

impl<W: AreaLoader> JobScheduler<W> {
    /// `budget` is the total time one [`pump`](Self::pump) may spend.
    pub fn new(budget: Duration) -> Self {
        Self {
            jobs: BTreeMap::new(),
            attached: BTreeMap::new(),
            runtime: TaskRuntime::new(),
            spawner: Spawner::new(),
            budget,
            timer: TickTimer::default(),
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn set_budget(&mut self, budget: Duration) {
        self.budget = budget;
    }

    /// Register a job without running anything. Its id can be shown and
    /// cancelled before a body is attached with [`perform`](Self::perform).
    pub fn start_job(
        &mut self,
        session: SessionId,
        total_steps_hint: Option<u32>,
        affected_region: Option<Region>,
    ) -> JobId {
        let id = self.spawner.allocate();
        self.jobs
            .insert(id, Job::new(id, session, total_steps_hint, affected_region));
        tracing::info!(job = %id, session = %session, "job started");
        id
    }

    /// Start a job running `body`. The job retires itself once finished.
    pub fn run<T, F>(&mut self, session: SessionId, total_steps_hint: Option<u32>, body: F) -> JobHandle<T>
    where
        T: 'static,
        F: FnMut(&mut JobContext<'_, W>) -> Result<Step<T>, BodyError> + 'static,
    {
        self.run_body(session, total_steps_hint, FnBody::new(body))
    }

    pub fn run_body<B>(&mut self, session: SessionId, total_steps_hint: Option<u32>, body: B) -> JobHandle<B::Output>
    where
        B: JobBody<W> + 'static,
    {
        let id = self.start_job(session, total_steps_hint, None);
        let (deliver, handle) = typed_delivery(id);
        self.attach(id, JobTask::new(body), deliver, true);
        handle
    }

    /// Attach a body to a job created by [`start_job`](Self::start_job). The
    /// job stays listed after it finishes until [`finish_job`](Self::finish_job).
    pub fn perform<T, F>(&mut self, id: JobId, body: F) -> Result<JobHandle<T>, SchedulerError>
    where
        T: 'static,
        F: FnMut(&mut JobContext<'_, W>) -> Result<Step<T>, BodyError> + 'static,
    {
        self.perform_body(id, FnBody::new(body))
    }

    pub fn perform_body<B>(&mut self, id: JobId, body: B) -> Result<JobHandle<B::Output>, SchedulerError>
    where
        B: JobBody<W> + 'static,
    {
        let job = self.jobs.get(&id).ok_or(SchedulerError::UnknownJob(id))?;
        if job.state.is_terminal() {
            return Err(SchedulerError::AlreadyFinished(id));
        }
        if job.task.is_some() {
            return Err(SchedulerError::AlreadyAttached(id));
        }
        let (deliver, handle) = typed_delivery(id);
        self.attach(id, JobTask::new(body), deliver, false);
        Ok(handle)
    }

    fn attach(&mut self, id: JobId, task: JobTask<W>, deliver: Deliver, auto_retire: bool) {
        let task_id = self.runtime.start(task);
        let Some(outcome) = self.runtime.awaitable(task_id) else {
            return;
        };
        let Some(job) = self.jobs.get_mut(&id) else {
            return;
        };
        job.task = Some(task_id);
        job.auto_retire = auto_retire;
        if job.cancel_requested {
            self.runtime.cancel(task_id);
        }
        self.attached.insert(
            id,
            Attached {
                outcome,
                deliver: Some(deliver),
            },
        );
    }

    pub fn next_step(&mut self, id: JobId, label: impl Into<String>) -> Result<(), SchedulerError> {
        let job = self.jobs.get_mut(&id).ok_or(SchedulerError::UnknownJob(id))?;
        job.begin_phase(label.into());
        Ok(())
    }

    /// `fraction` in `[0,1]`, or `-1` for indeterminate.
    pub fn set_progress(&mut self, id: JobId, fraction: f32) -> Result<(), SchedulerError> {
        let job = self.jobs.get_mut(&id).ok_or(SchedulerError::UnknownJob(id))?;
        job.set_fraction(fraction);
        Ok(())
    }

    /// Request cancellation of `id` and every descendant. Returns the jobs
    /// that were newly asked to cancel; finished jobs are left alone.
    pub fn cancel_job(&mut self, id: JobId) -> Result<Vec<JobId>, SchedulerError> {
        if !self.jobs.contains_key(&id) {
            return Err(SchedulerError::UnknownJob(id));
        }
        let mut cancelled = Vec::new();
        let mut queue = VecDeque::from([id]);
        while let Some(next) = queue.pop_front() {
            let Some(job) = self.jobs.get_mut(&next) else {
                continue;
            };
            queue.extend(job.children.iter().copied());
            if job.state.is_terminal() || job.cancel_requested {
                continue;
            }
            job.cancel_requested = true;
            if let Some(task) = job.task {
                self.runtime.cancel(task);
            }
            cancelled.push(next);
        }
        if !cancelled.is_empty() {
            tracing::info!(job = %id, count = cancelled.len(), "job cancellation requested");
        }
        Ok(cancelled)
    }

    /// Cancel every live job of a session.
    pub fn cancel_session(&mut self, session: SessionId) -> Vec<JobId> {
        let roots: Vec<JobId> = self
            .jobs
            .values()
            .filter(|job| job.session == session)
            .map(|job| job.id)
            .collect();
        let mut cancelled = Vec::new();
        for id in roots {
            if let Ok(ids) = self.cancel_job(id) {
                cancelled.extend(ids);
            }
        }
        cancelled
    }

    /// Tear down a job. A still-running body is cancelled and the job retires
    /// once that is observed. Unknown or already removed ids are ignored.
    pub fn finish_job(&mut self, id: JobId) {
        let Some(job) = self.jobs.get_mut(&id) else {
            return;
        };
        if job.task.is_some() && !job.state.is_terminal() {
            job.auto_retire = true;
            self.cancel_job(id).ok();
            return;
        }
        if let Some(job) = self.jobs.remove(&id) {
            self.attached.remove(&id);
            tracing::debug!(job = %id, session = %job.session, "job removed");
        }
    }

    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    /// Listed jobs of a session, oldest first.
    pub fn jobs_for_session(&self, session: SessionId) -> Vec<&Job> {
        self.jobs.values().filter(|job| job.session == session).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Recent pump durations.
    pub fn timer(&self) -> &TickTimer {
        &self.timer
    }

    /// Action-bar text for a session's labelled jobs, if any.
    pub fn progress_report(&self, session: SessionId) -> Option<String> {
        report::render(self.jobs_for_session(session))
    }

    /// One host tick: resume every runnable job within the time budget,
    /// register children spawned during it and settle finished jobs.
    pub fn pump(&mut self, world: &mut W) -> PumpSummary {
        let _span = tracing::info_span!("job_pump", jobs = self.jobs.len()).entered();
        let tick = TickBudget::start(self.budget);
        let runnable: Vec<(JobId, voxedit_task::TaskId)> = self
            .jobs
            .values()
            .filter(|job| !job.state.is_terminal())
            .filter_map(|job| job.task.map(|task| (job.id, task)))
            .collect();

        let mut summary = PumpSummary::default();
        let mut ended = Vec::new();
        for (i, (id, task)) in runnable.iter().copied().enumerate() {
            let Some(job) = self.jobs.get_mut(&id) else {
                continue;
            };
            job.ticks_alive += 1;
            if let Some((min, max)) = job.waiting_on {
                if !job.cancel_requested && !world.is_area_loaded(min, max) {
                    summary.waiting += 1;
                    continue;
                }
                job.waiting_on = None;
                job.load_requested = false;
            }

            let slice = tick.slice(runnable.len() - i);
            let state = {
                let mut cx = JobContext {
                    world: &mut *world,
                    job: &mut *job,
                    spawner: &mut self.spawner,
                };
                self.runtime.resume(task, &mut cx, slice)
            };
            let Some(state) = state else {
                continue;
            };
            summary.resumed += 1;
            job.state = JobState::from_task(state);

            if let Some((min, max)) = job.waiting_on {
                if !job.load_requested && !state.is_terminal() {
                    job.load_requested = true;
                    world.request_area(min, max);
                    tracing::debug!(job = %id, %min, %max, "job waiting for area to load");
                }
            }
            if state.is_terminal() {
                ended.push(id);
            }
            self.register_children(id);
        }

        for id in ended {
            if let Some(finished) = self.settle(id) {
                summary.finished.push(finished);
            }
        }
        summary.elapsed = tick.elapsed();
        self.timer.record(summary.elapsed);
        summary
    }

    fn register_children(&mut self, parent: JobId) {
        if self.spawner.queue.is_empty() {
            return;
        }
        let Some(session) = self.jobs.get(&parent).map(|job| job.session) else {
            return;
        };
        let spawned: Vec<Spawned<W>> = self.spawner.queue.drain(..).collect();
        for child in spawned {
            let mut job = Job::new(child.id, session, child.total_steps_hint, None);
            job.parent = Some(parent);
            self.jobs.insert(child.id, job);
            if let Some(parent_job) = self.jobs.get_mut(&parent) {
                parent_job.children.push(child.id);
            }
            tracing::info!(job = %child.id, parent = %parent, session = %session, "child job started");
            self.attach(child.id, child.task, child.deliver, true);
        }
        let parent_stopping = self
            .jobs
            .get(&parent)
            .is_some_and(|job| job.cancel_requested || job.state.is_terminal());
        if parent_stopping {
            let children = self.jobs.get(&parent).map(|job| job.children.clone()).unwrap_or_default();
            for child in children {
                self.cancel_job(child).ok();
            }
        }
    }

    /// Deliver a terminal job's result and retire it if it manages itself.
    fn settle(&mut self, id: JobId) -> Option<FinishedJob> {
        let attached = self.attached.remove(&id)?;
        let result = match attached.outcome.try_take()? {
            Ok(value) => Ok(value),
            Err(TaskError::Cancelled) => Err(JobError::Cancelled(id)),
            Err(TaskError::Failed(err)) => Err(err),
        };

        let job = self.jobs.get_mut(&id)?;
        let state = match &result {
            Ok(_) => {
                job.mark_completed();
                JobState::Completed
            }
            Err(JobError::Cancelled(_)) => {
                job.state = JobState::Cancelled;
                JobState::Cancelled
            }
            Err(JobError::Failed(_)) => {
                job.state = JobState::Failed;
                JobState::Failed
            }
        };
        let error = match &result {
            Err(JobError::Failed(err)) => Some(err.to_string()),
            _ => None,
        };
        let finished = FinishedJob {
            id,
            session: job.session,
            state,
            error,
        };
        match state {
            JobState::Failed => tracing::warn!(
                job = %id,
                session = %job.session,
                error = finished.error.as_deref().unwrap_or_default(),
                "job failed"
            ),
            _ => tracing::info!(job = %id, session = %job.session, ?state, "job finished"),
        }

        let stop_children = state != JobState::Completed;
        let auto_retire = job.auto_retire;
        if let Some(deliver) = attached.deliver {
            deliver(result);
        }
        if stop_children {
            let children = self.jobs.get(&id).map(|job| job.children.clone()).unwrap_or_default();
            for child in children {
                self.cancel_job(child).ok();
            }
        }
        if auto_retire {
            self.jobs.remove(&id);
        }
        Some(finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use voxedit_common::{Block, BlockPos};
    use voxedit_kernel::World;

    use crate::body::Cancelled;
    use crate::job::Progress;

    fn scheduler() -> JobScheduler<World> {
        JobScheduler::new(Duration::ZERO)
    }

    fn drain(sched: &mut JobScheduler<World>, world: &mut World) -> u32 {
        let mut ticks = 0;
        while sched.runtime.len() > 0 && ticks < 10_000 {
            world.step();
            sched.pump(world);
            ticks += 1;
        }
        ticks
    }

    #[test]
    fn run_completes_and_retires() {
        let mut sched = scheduler();
        let mut world = World::new();
        let session = SessionId::new();
        let mut n = 0;
        let handle = sched.run(session, Some(1), move |cx: &mut JobContext<'_, World>| {
            if n == 0 {
                cx.next_step("Counting");
            }
            if n == 5 {
                return Ok(Step::Done(n));
            }
            n += 1;
            Ok(Step::Continue)
        });
        assert_eq!(sched.jobs_for_session(session).len(), 1);
        assert_eq!(sched.job(handle.id()).unwrap().state(), JobState::Created);

        drain(&mut sched, &mut world);
        assert_eq!(handle.try_take().unwrap().unwrap(), 5);
        assert!(sched.jobs_for_session(session).is_empty());
    }

    #[test]
    fn every_step_runs_once_across_ticks() {
        let mut sched = scheduler();
        let mut world = World::new();
        let ran = Rc::new(Cell::new(0u32));
        let counter = ran.clone();
        let mut i = 0;
        sched.run(SessionId::new(), None, move |_: &mut JobContext<'_, World>| {
            if i == 40 {
                return Ok(Step::Done(()));
            }
            i += 1;
            counter.set(counter.get() + 1);
            Ok(Step::Continue)
        });
        let ticks = drain(&mut sched, &mut world);
        assert_eq!(ran.get(), 40);
        assert_eq!(ticks, 41);
    }

    #[test]
    fn progress_is_monotonic_and_one_at_completion() {
        let mut sched = scheduler();
        let mut world = World::new();
        let session = SessionId::new();
        let id = sched.start_job(session, Some(4), None);
        let mut step = 0u32;
        let handle = sched
            .perform(id, move |cx: &mut JobContext<'_, World>| {
                if step % 10 == 0 {
                    cx.next_step(format!("phase {}", step / 10));
                }
                cx.set_progress((step % 10) as f32 / 10.0);
                step += 1;
                if step == 40 {
                    Ok(Step::Done(()))
                } else {
                    Ok(Step::Continue)
                }
            })
            .unwrap();

        let mut last = 0.0;
        while !handle.is_settled() {
            world.step();
            sched.pump(&mut world);
            let job = sched.job(id).unwrap();
            let p = job.progress().fraction().unwrap();
            assert!(p >= last);
            if !job.state().is_terminal() {
                assert!(p < 1.0);
            }
            last = p;
        }
        let job = sched.job(id).unwrap();
        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(job.progress(), Progress::Fraction(1.0));

        // Started with start_job: listed until finished explicitly.
        sched.finish_job(id);
        sched.finish_job(id);
        assert!(sched.job(id).is_none());
    }

    #[test]
    fn failure_reaches_the_handle_and_summary() {
        let mut sched = scheduler();
        let mut world = World::new();
        let session = SessionId::new();
        let mut i = 0;
        let handle = sched.run(session, Some(100), move |_: &mut JobContext<'_, World>| -> Result<Step<()>, BodyError> {
            i += 1;
            if i == 57 {
                return Err("invariant violated".into());
            }
            Ok(Step::Continue)
        });

        let mut finished = Vec::new();
        while !handle.is_settled() {
            finished.extend(sched.pump(&mut world).finished);
        }
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].state, JobState::Failed);
        assert_eq!(finished[0].session, session);
        assert_eq!(finished[0].error.as_deref(), Some("invariant violated"));
        assert!(matches!(handle.try_take(), Some(Err(JobError::Failed(_)))));
    }

    #[test]
    fn cancelling_parent_stops_child() {
        let mut sched = scheduler();
        let mut world = World::new();
        let session = SessionId::new();
        let child_steps = Rc::new(Cell::new(0u32));
        let counter = child_steps.clone();
        let mut child = None;

        let parent = sched.run(session, None, move |cx: &mut JobContext<'_, World>| {
            if child.is_none() {
                let counter = counter.clone();
                child = Some(cx.spawn(None, move |_: &mut JobContext<'_, World>| {
                    counter.set(counter.get() + 1);
                    Ok(Step::<()>::Continue)
                }));
            }
            Ok(Step::<()>::Yield)
        });

        sched.pump(&mut world);
        sched.pump(&mut world);
        let parent_job = sched.job(parent.id()).unwrap();
        let child_id = parent_job.children()[0];
        assert_eq!(sched.job(child_id).unwrap().parent(), Some(parent.id()));
        let before = child_steps.get();
        assert!(before >= 1);

        let cancelled = sched.cancel_job(parent.id()).unwrap();
        assert_eq!(cancelled, vec![parent.id(), child_id]);
        sched.pump(&mut world);
        assert_eq!(child_steps.get(), before);
        assert!(matches!(parent.try_take(), Some(Err(JobError::Cancelled(_)))));
        assert!(sched.jobs_for_session(session).is_empty());
    }

    #[test]
    fn checkpoint_maps_to_cancellation() {
        let mut sched = scheduler();
        let mut world = World::new();
        let handle = sched.run(SessionId::new(), None, |cx: &mut JobContext<'_, World>| {
            cx.checkpoint()?;
            Err::<Step<()>, BodyError>(Cancelled.into())
        });
        sched.pump(&mut world);
        assert!(matches!(handle.try_take(), Some(Err(JobError::Cancelled(_)))));
    }

    #[test]
    fn cancel_before_attach_applies_on_perform() {
        let mut sched = scheduler();
        let mut world = World::new();
        let id = sched.start_job(SessionId::new(), None, None);
        assert_eq!(sched.cancel_job(id).unwrap(), vec![id]);
        let handle = sched
            .perform(id, |_: &mut JobContext<'_, World>| Ok(Step::Done(1)))
            .unwrap();
        sched.pump(&mut world);
        assert!(matches!(handle.try_take(), Some(Err(JobError::Cancelled(_)))));
        assert_eq!(sched.job(id).unwrap().state(), JobState::Cancelled);
        assert_eq!(
            sched.perform(id, |_: &mut JobContext<'_, World>| Ok(Step::Done(2))).err(),
            Some(SchedulerError::AlreadyFinished(id))
        );
    }

    #[test]
    fn unknown_job_errors() {
        let mut sched = scheduler();
        assert_eq!(sched.cancel_job(JobId(9)), Err(SchedulerError::UnknownJob(JobId(9))));
        assert_eq!(sched.next_step(JobId(9), "x"), Err(SchedulerError::UnknownJob(JobId(9))));
        sched.finish_job(JobId(9));
    }

    #[test]
    fn parked_job_waits_for_area_and_requests_it_once() {
        let mut sched = scheduler();
        let mut world = World::lazy(1);
        let far = BlockPos::new(100, 0, 100);
        let handle = sched.run(SessionId::new(), None, move |cx: &mut JobContext<'_, World>| {
            if let Some(step) = cx.park_until_loaded(far, far) {
                return Ok(step);
            }
            cx.world_mut().set_block(far, Some(Block::new("stone")))?;
            Ok(Step::Done(()))
        });

        let first = sched.pump(&mut world);
        assert_eq!(first.resumed, 1);
        assert_eq!(world.pending_loads(), 1);
        let job = sched.job(handle.id()).unwrap();
        assert_eq!(job.state(), JobState::Suspended);
        assert_eq!(job.waiting_on(), Some((far, far)));

        let second = sched.pump(&mut world);
        assert_eq!(second.resumed, 0);
        assert_eq!(second.waiting, 1);
        assert_eq!(world.pending_loads(), 1);

        world.step();
        sched.pump(&mut world);
        assert!(handle.try_take().unwrap().is_ok());
        assert_eq!(world.get_block(far).unwrap(), Some(&Block::new("stone")));
    }

    #[test]
    fn pump_time_is_recorded() {
        let mut sched = scheduler();
        let mut world = World::new();
        sched.pump(&mut world);
        sched.pump(&mut world);
        assert_eq!(sched.timer().count(), 2);
    }
}
