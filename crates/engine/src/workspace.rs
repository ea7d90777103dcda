use std::collections::BTreeMap;

use voxedit_common::{BlockPos, Region, Selection, SessionId};
use voxedit_history::{HistoryError, HistoryManager, RecordId};
use voxedit_jobs::{AreaLoader, JobContext, JobId};
use voxedit_kernel::World;

use crate::EngineError;
use crate::session::Session;

/// The shared world and every session editing it. Job bodies run against it.
#[derive(Debug, Default)]
pub struct Workspace {
    world: World,
    sessions: BTreeMap<SessionId, Session>,
}

impl Workspace {
    pub fn new(world: World) -> Self {
        Self {
            world,
            sessions: BTreeMap::new(),
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn session_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// The world and one session, borrowed together.
    pub fn split(&mut self, id: SessionId) -> Option<(&mut World, &mut Session)> {
        let session = self.sessions.get_mut(&id)?;
        Some((&mut self.world, session))
    }

    pub(crate) fn insert(&mut self, session: Session) {
        self.sessions.insert(session.id(), session);
    }

    pub(crate) fn remove(&mut self, id: SessionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    pub(crate) fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }
}

impl AreaLoader for Workspace {
    fn is_area_loaded(&self, min: BlockPos, max: BlockPos) -> bool {
        self.world.is_area_loaded(min, max)
    }

    fn request_area(&mut self, min: BlockPos, max: BlockPos) {
        self.world.request_area(min, max);
    }
}

/// What edit bodies receive on every step.
pub type EditContext<'a> = JobContext<'a, Workspace>;

/// Access to the running job's session from an [`EditContext`].
pub trait EditContextExt {
    /// Borrow the world together with the job's session.
    fn edit(&mut self) -> Result<EditScope<'_>, EngineError>;
}

impl EditContextExt for JobContext<'_, Workspace> {
    fn edit(&mut self) -> Result<EditScope<'_>, EngineError> {
        let job = self.id();
        let session_id = self.session();
        let (world, session) = self
            .world_mut()
            .split(session_id)
            .ok_or(EngineError::UnknownSession(session_id))?;
        Ok(EditScope {
            world,
            session,
            job,
        })
    }
}

/// The world and one session, as seen by one job step.
///
/// Records opened here are owned by the job; if the job ends without
/// committing, the engine rolls the record back.
pub struct EditScope<'a> {
    world: &'a mut World,
    session: &'a mut Session,
    job: JobId,
}

impl EditScope<'_> {
    pub fn world(&mut self) -> &mut World {
        &mut *self.world
    }

    pub fn selection(&self) -> &Selection {
        &self.session.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.session.selection
    }

    pub fn history(&self) -> &HistoryManager {
        &self.session.history
    }

    pub fn record(&mut self) -> Result<RecordId, HistoryError> {
        let record = self.session.history.record()?;
        self.session.record_owner = Some(self.job);
        Ok(record)
    }

    /// Snapshot `regions` before they are mutated.
    pub fn track(&mut self, record: RecordId, regions: &[Region]) -> Result<(), HistoryError> {
        self.session.history.track_region(record, self.world, regions)
    }

    pub fn record_selection(&mut self, record: RecordId) -> Result<(), HistoryError> {
        self.session
            .history
            .record_selection(record, &self.session.selection)
    }

    pub fn commit(&mut self, record: RecordId) -> Result<(), HistoryError> {
        let result = self.session.history.commit(record, self.world);
        self.release_ownership();
        result
    }

    pub fn cancel(&mut self, record: RecordId) -> Result<bool, HistoryError> {
        let result = self.session.history.cancel(record, self.world);
        self.release_ownership();
        result
    }

    fn release_ownership(&mut self) {
        if !self.session.history.is_recording() {
            self.session.record_owner = None;
        }
    }
}
