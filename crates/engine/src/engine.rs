use voxedit_common::{Region, SessionId};
use voxedit_jobs::{BodyError, JobBody, JobHandle, JobId, JobScheduler, PumpSummary, Step};
use voxedit_kernel::{World, WorldEvent};

use crate::command::{Command, CommandOutput};
use crate::config::{EngineConfig, limit_from};
use crate::edits::{FILL_PHASES, FillBody, FillMode};
use crate::error::EngineError;
use crate::session::Session;
use crate::workspace::{EditContext, Workspace};

/// What one [`EditEngine::tick`] did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub tick: u64,
    pub pump: PumpSummary,
    /// Records rolled back because the job that opened them ended without
    /// committing, by session.
    pub rolled_back: Vec<SessionId>,
    /// Departed sessions whose history was deleted this tick.
    pub deleted_sessions: Vec<SessionId>,
    /// World changes made during the tick.
    pub events: Vec<WorldEvent>,
}

/// Owns the world, every session and the job scheduler. The host calls
/// [`tick`](Self::tick) once per world tick and routes user input through
/// [`dispatch`](Self::dispatch).
pub struct EditEngine {
    config: EngineConfig,
    workspace: Workspace,
    scheduler: JobScheduler<Workspace>,
}

impl EditEngine {
    /// Engine over an empty world whose chunks load lazily.
    pub fn new(config: EngineConfig) -> Self {
        let world = World::lazy(config.chunk_loads_per_tick);
        Self::with_world(config, world)
    }

    pub fn with_world(config: EngineConfig, world: World) -> Self {
        let scheduler = JobScheduler::new(config.time_budget());
        Self {
            config,
            workspace: Workspace::new(world),
            scheduler,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn workspace_mut(&mut self) -> &mut Workspace {
        &mut self.workspace
    }

    pub fn world(&self) -> &World {
        self.workspace.world()
    }

    pub fn scheduler(&self) -> &JobScheduler<Workspace> {
        &self.scheduler
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.workspace.session(id)
    }

    /// Start or resume a user's session. A departed session with the same
    /// name that has not been deleted yet is revived with its history.
    pub fn join(&mut self, name: impl Into<String>) -> SessionId {
        let name = name.into();
        let existing = self
            .workspace
            .sessions()
            .find(|session| session.name() == name)
            .map(Session::id);
        if let Some(id) = existing {
            if let Some(session) = self.workspace.session_mut(id) {
                if session.pending_deletion.take().is_some() {
                    tracing::info!(session = %id, %name, "session revived");
                }
            }
            return id;
        }

        let session = Session::new(
            name.clone(),
            self.config.history_config(),
            self.config.compress_snapshots,
        );
        let id = session.id();
        self.workspace.insert(session);
        tracing::info!(session = %id, %name, "session joined");
        id
    }

    /// A user left: cancel their jobs, roll back their open record and
    /// schedule the history for deletion.
    pub fn leave(&mut self, id: SessionId) -> Result<(), EngineError> {
        let cancelled = self.scheduler.cancel_session(id);
        let (world, session) = self
            .workspace
            .split(id)
            .ok_or(EngineError::UnknownSession(id))?;
        if session.pending_deletion.is_some() {
            return Ok(());
        }
        let rolled_back = session.history.cancel_open(world)?;
        session.record_owner = None;
        tracing::info!(
            session = %id,
            jobs = cancelled.len(),
            rolled_back,
            "session left"
        );
        if self.config.ticks_to_delete_session == 0 {
            self.delete_session(id);
        } else {
            session.pending_deletion = Some(self.config.ticks_to_delete_session);
        }
        Ok(())
    }

    /// Run a user command. On failure, a record the command left open is
    /// rolled back unless a live job still owns it.
    pub fn dispatch(&mut self, id: SessionId, command: Command) -> Result<CommandOutput, EngineError> {
        tracing::debug!(session = %id, ?command, "dispatch");
        let result = self.execute(id, command);
        if let Err(err) = &result {
            tracing::warn!(session = %id, error = %err, "command failed");
            self.close_abandoned_record(id);
        }
        result
    }

    /// Start an edit job for a session. The body gets the world, the
    /// session's selection and history through [`EditContext`].
    pub fn run_edit<T, F>(
        &mut self,
        id: SessionId,
        total_steps_hint: Option<u32>,
        body: F,
    ) -> Result<JobHandle<T>, EngineError>
    where
        T: 'static,
        F: FnMut(&mut EditContext<'_>) -> Result<Step<T>, BodyError> + 'static,
    {
        self.active_session(id)?;
        Ok(self.scheduler.run(id, total_steps_hint, body))
    }

    pub fn run_edit_body<B>(
        &mut self,
        id: SessionId,
        total_steps_hint: Option<u32>,
        body: B,
    ) -> Result<JobHandle<B::Output>, EngineError>
    where
        B: JobBody<Workspace> + 'static,
    {
        self.active_session(id)?;
        Ok(self.scheduler.run_body(id, total_steps_hint, body))
    }

    /// Cancel a job and its sub-jobs. Returns the jobs asked to stop.
    pub fn cancel_job(&mut self, job: JobId) -> Result<Vec<JobId>, EngineError> {
        Ok(self.scheduler.cancel_job(job)?)
    }

    /// One host tick: the world advances (loading queued chunks), jobs run
    /// within the time budget, records of jobs that ended without
    /// committing are rolled back and departed sessions count down.
    pub fn tick(&mut self) -> TickReport {
        self.workspace.world_mut().step();
        let tick = self.workspace.world().tick();
        let _span = tracing::info_span!("engine_tick", tick).entered();

        let pump = self.scheduler.pump(&mut self.workspace);
        let mut rolled_back = Vec::new();
        for id in self.workspace.session_ids() {
            if self.close_abandoned_record(id) {
                rolled_back.push(id);
            }
        }
        let deleted_sessions = self.count_down_departed();
        let events = self.workspace.world_mut().drain_events();

        TickReport {
            tick,
            pump,
            rolled_back,
            deleted_sessions,
            events,
        }
    }

    /// Action-bar text for a session's running jobs.
    pub fn progress_report(&self, id: SessionId) -> Option<String> {
        self.scheduler.progress_report(id)
    }

    fn execute(&mut self, id: SessionId, command: Command) -> Result<CommandOutput, EngineError> {
        self.active_session(id)?;
        match command {
            Command::Undo => {
                let (world, session) = self.split(id)?;
                let done = session.history.undo(world, &mut session.selection)?;
                Ok(message(if done { "Undo successful." } else { "Nothing left to undo." }))
            }
            Command::Redo => {
                let (world, session) = self.split(id)?;
                let done = session.history.redo(world, &mut session.selection)?;
                Ok(message(if done { "Redo successful." } else { "Nothing left to redo." }))
            }
            Command::ClearHistory => {
                let (_, session) = self.split(id)?;
                session.history.clear()?;
                Ok(message("History cleared."))
            }
            Command::Cancel(job) => {
                let owner = self
                    .scheduler
                    .job(job)
                    .map(|j| j.session())
                    .ok_or(voxedit_jobs::SchedulerError::UnknownJob(job))?;
                if owner != id {
                    return Err(EngineError::ForeignJob(job));
                }
                let cancelled = self.scheduler.cancel_job(job)?;
                Ok(message(format!("Cancelled {} job(s).", cancelled.len())))
            }
            Command::Jobs => Ok(message(self.list_jobs(id))),
            Command::Set { region, block } => self.start_fill(id, region, FillMode::Set(block)),
            Command::Replace { region, from, to } => {
                self.start_fill(id, region, FillMode::Replace { from, to })
            }
            Command::Limit(value) => {
                let limit = match value {
                    -1 => None,
                    v if v > 0 => limit_from(v),
                    v => return Err(EngineError::InvalidChangeLimit(v)),
                };
                if let Some(max) = self.config.max_change_limit() {
                    if limit.is_none_or(|l| l > max) {
                        return Err(EngineError::ChangeLimitTooHigh { max });
                    }
                }
                let (_, session) = self.split(id)?;
                session.history.set_change_limit(limit);
                Ok(message(match limit {
                    Some(l) => format!("Block change limit set to {l}."),
                    None => "Block change limit removed.".to_string(),
                }))
            }
            Command::Select { corner, pos } => {
                let (_, session) = self.split(id)?;
                session.selection.set(corner, pos);
                Ok(message(format!(
                    "Position {} set to {pos} ({} blocks).",
                    corner + 1,
                    session.selection.volume()
                )))
            }
        }
    }

    fn start_fill(
        &mut self,
        id: SessionId,
        region: Option<Region>,
        mode: FillMode,
    ) -> Result<CommandOutput, EngineError> {
        let max = self.config.max_region_volume;
        let (_, session) = self.split(id)?;
        if session.history.is_recording() {
            return Err(voxedit_history::HistoryError::StillRecording.into());
        }
        let region = match region {
            Some(region) => region,
            None => session.selection.region().ok_or(EngineError::NoSelection)?,
        };
        let volume = region.volume();
        if volume > max {
            return Err(EngineError::RegionTooLarge { volume, max });
        }
        let handle = self.run_edit_body(id, Some(FILL_PHASES), FillBody::new(region, mode))?;
        Ok(CommandOutput::Started { job: handle.id() })
    }

    fn list_jobs(&self, id: SessionId) -> String {
        let jobs = self.scheduler.jobs_for_session(id);
        if jobs.is_empty() {
            return "No jobs running.".to_string();
        }
        jobs.iter()
            .map(|job| {
                let progress = job
                    .progress()
                    .fraction()
                    .map_or_else(|| "?".to_string(), |f| format!("{:.2}%", f * 100.0));
                format!("Job {}: {:?} {} {}", job.id(), job.state(), job.label(), progress)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn active_session(&self, id: SessionId) -> Result<&Session, EngineError> {
        self.workspace
            .session(id)
            .filter(|session| session.is_active())
            .ok_or(EngineError::UnknownSession(id))
    }

    fn split(&mut self, id: SessionId) -> Result<(&mut World, &mut Session), EngineError> {
        self.workspace
            .split(id)
            .ok_or(EngineError::UnknownSession(id))
    }

    /// Roll back a session's open record when no live job owns it.
    fn close_abandoned_record(&mut self, id: SessionId) -> bool {
        let owner_live = self
            .workspace
            .session(id)
            .and_then(|session| session.record_owner)
            .and_then(|job| self.scheduler.job(job))
            .is_some_and(|job| !job.state().is_terminal());
        if owner_live {
            return false;
        }
        let Some((world, session)) = self.workspace.split(id) else {
            return false;
        };
        if !session.history.is_recording() {
            session.record_owner = None;
            return false;
        }
        let owner = session.record_owner.take();
        match session.history.cancel_open(world) {
            Ok(rolled_back) => {
                tracing::info!(session = %id, job = ?owner, "abandoned record rolled back");
                rolled_back
            }
            Err(err) => {
                tracing::warn!(session = %id, error = %err, "failed to roll back abandoned record");
                false
            }
        }
    }

    fn count_down_departed(&mut self) -> Vec<SessionId> {
        let mut expired = Vec::new();
        for id in self.workspace.session_ids() {
            let Some(session) = self.workspace.session_mut(id) else {
                continue;
            };
            if let Some(left) = session.pending_deletion.as_mut() {
                *left = left.saturating_sub(1);
                if *left == 0 {
                    expired.push(id);
                }
            }
        }
        for id in &expired {
            self.delete_session(*id);
        }
        expired
    }

    fn delete_session(&mut self, id: SessionId) {
        if let Some(mut session) = self.workspace.remove(id) {
            let released = session.history.stored_snapshots();
            session.history.delete_all();
            tracing::info!(session = %id, released, "session deleted");
        }
    }
}

fn message(text: impl Into<String>) -> CommandOutput {
    CommandOutput::Message(text.into())
}
