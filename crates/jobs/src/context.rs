use voxedit_common::{BlockPos, SessionId};
use voxedit_kernel::World;
use voxedit_task::Step;

use crate::body::{BodyError, Cancelled, Deliver, FnBody, JobBody, JobHandle, JobTask, typed_delivery};
use crate::job::{Job, JobId, Progress};

/// The host's lazily loaded world, as far as job suspension is concerned.
pub trait AreaLoader {
    fn is_area_loaded(&self, min: BlockPos, max: BlockPos) -> bool;

    /// Ask the host to make the area available. Loading happens on later ticks.
    fn request_area(&mut self, min: BlockPos, max: BlockPos);
}

impl AreaLoader for World {
    fn is_area_loaded(&self, min: BlockPos, max: BlockPos) -> bool {
        World::is_area_loaded(self, min, max)
    }

    fn request_area(&mut self, min: BlockPos, max: BlockPos) {
        World::request_area(self, min, max);
    }
}

/// A child job queued by a running body, registered after its step returns.
pub(crate) struct Spawned<W: AreaLoader> {
    pub(crate) id: JobId,
    pub(crate) total_steps_hint: Option<u32>,
    pub(crate) task: JobTask<W>,
    pub(crate) deliver: Deliver,
}

/// Job id allocation and the queue of children spawned mid-step.
pub(crate) struct Spawner<W: AreaLoader> {
    next_id: u64,
    pub(crate) queue: Vec<Spawned<W>>,
}

impl<W: AreaLoader> Spawner<W> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 1,
            queue: Vec::new(),
        }
    }

    pub(crate) fn allocate(&mut self) -> JobId {
        let id = JobId(self.next_id);
        self.next_id += 1;
        id
    }
}

/// What a job body sees on every step: its own job record and the world.
pub struct JobContext<'a, W: AreaLoader> {
    pub(crate) world: &'a mut W,
    pub(crate) job: &'a mut Job,
    pub(crate) spawner: &'a mut Spawner<W>,
}

impl<'a, W: AreaLoader> JobContext<'a, W> {
    pub fn id(&self) -> JobId {
        self.job.id
    }

    pub fn session(&self) -> SessionId {
        self.job.session
    }

    pub fn job(&self) -> &Job {
        &*self.job
    }

    pub fn world(&self) -> &W {
        &*self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut *self.world
    }

    /// Start a new named phase. Resets the phase fraction.
    pub fn next_step(&mut self, label: impl Into<String>) {
        let label = label.into();
        tracing::debug!(job = %self.job.id, phase = self.job.phase + 1, %label, "job phase");
        self.job.begin_phase(label);
    }

    /// Fraction of the current phase in `[0,1]`, or negative for indeterminate.
    pub fn set_progress(&mut self, fraction: f32) {
        self.job.set_fraction(fraction);
    }

    pub fn progress(&self) -> Progress {
        self.job.progress()
    }

    pub fn is_cancelled(&self) -> bool {
        self.job.cancel_requested
    }

    /// Fails with [`Cancelled`] once cancellation was requested. For bodies
    /// doing long loops inside a single step.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.job.cancel_requested {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Whether `pos` is available. When it is not, the job is marked as
    /// waiting on it and the body should return [`Step::Park`].
    pub fn load_block(&mut self, pos: BlockPos) -> bool {
        self.load_area(pos, pos)
    }

    /// Whether the box is available. When it is not, the job is marked as
    /// waiting on it and the body should return [`Step::Park`]; the step is
    /// drawn again once the host has loaded the area.
    pub fn load_area(&mut self, min: BlockPos, max: BlockPos) -> bool {
        let (min, max) = (min.min(max), min.max(max));
        if self.world.is_area_loaded(min, max) {
            return true;
        }
        if self.job.waiting_on != Some((min, max)) {
            self.job.waiting_on = Some((min, max));
            self.job.load_requested = false;
        }
        false
    }

    /// [`load_area`](Self::load_area) as a step result: `Some(Step::Park)`
    /// while the area is missing.
    pub fn park_until_loaded<T>(&mut self, min: BlockPos, max: BlockPos) -> Option<Step<T>> {
        if self.load_area(min, max) {
            None
        } else {
            Some(Step::Park)
        }
    }

    /// Start a child job. It is cancelled together with this job and begins
    /// running on the next tick.
    pub fn spawn<T, F>(&mut self, total_steps_hint: Option<u32>, body: F) -> JobHandle<T>
    where
        T: 'static,
        F: FnMut(&mut JobContext<'_, W>) -> Result<Step<T>, BodyError> + 'static,
    {
        self.spawn_body(total_steps_hint, FnBody::new(body))
    }

    pub fn spawn_body<B>(&mut self, total_steps_hint: Option<u32>, body: B) -> JobHandle<B::Output>
    where
        B: JobBody<W> + 'static,
    {
        let id = self.spawner.allocate();
        let (deliver, handle) = typed_delivery(id);
        self.spawner.queue.push(Spawned {
            id,
            total_steps_hint,
            task: JobTask::new(body),
            deliver,
        });
        handle
    }
}
