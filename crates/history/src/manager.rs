use std::collections::VecDeque;

use voxedit_common::{BlockPos, Region, Selection};
use voxedit_kernel::World;
use voxedit_persist::{CaptureOptions, RegionSnapshot, StoreError, StructureStore, StructureToken};

use crate::record::{BlockFilter, HistoryEntry, HistoryRecord, RecordId, RecordState, SelectionCapture};

/// Errors from history operations.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history is already being recorded (record {0})")]
    AlreadyRecording(RecordId),
    #[error("history was not being recorded")]
    NotRecording,
    #[error("record {0} is not the open record")]
    UnknownRecord(RecordId),
    #[error("history is still being recorded")]
    StillRecording,
    #[error("change limit of {limit} blocks exceeded ({attempted} blocks)")]
    ChangeLimitExceeded { limit: u64, attempted: u64 },
    #[error("selection was already recorded twice")]
    SelectionAlreadyRecorded,
    #[error("region {min} to {max} is not loaded")]
    RegionUnavailable { min: BlockPos, max: BlockPos },
    #[error("failed to save history: {0}")]
    Store(#[from] StoreError),
}

/// Per-session history limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Committed records kept on the undo stack.
    pub max_size: usize,
    /// Blocks one record may capture for undo; `None` is unlimited.
    pub change_limit: Option<u64>,
    pub capture: CaptureOptions,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_size: 20,
            change_limit: None,
            capture: CaptureOptions::default(),
        }
    }
}

/// Undo and redo stacks of one session, plus the single open record.
pub struct HistoryManager {
    store: Box<dyn StructureStore>,
    config: HistoryConfig,
    open: Option<HistoryRecord>,
    undo: VecDeque<HistoryRecord>,
    redo: Vec<HistoryRecord>,
    next_record: u64,
}

impl std::fmt::Debug for HistoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryManager")
            .field("config", &self.config)
            .field("open", &self.open.as_ref().map(HistoryRecord::id))
            .field("undo", &self.undo.len())
            .field("redo", &self.redo.len())
            .field("stored", &self.store.len())
            .finish()
    }
}

impl HistoryManager {
    pub fn new(store: Box<dyn StructureStore>, config: HistoryConfig) -> Self {
        Self {
            store,
            config,
            open: None,
            undo: VecDeque::new(),
            redo: Vec::new(),
            next_record: 1,
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn set_change_limit(&mut self, limit: Option<u64>) {
        self.config.change_limit = limit;
    }

    /// Open a new record. Only one may be open at a time.
    pub fn record(&mut self) -> Result<RecordId, HistoryError> {
        if let Some(open) = &self.open {
            return Err(HistoryError::AlreadyRecording(open.id));
        }
        let id = RecordId(self.next_record);
        self.next_record += 1;
        self.open = Some(HistoryRecord::open(id));
        tracing::debug!(record = %id, "history record opened");
        Ok(id)
    }

    pub fn is_recording(&self) -> bool {
        self.open.is_some()
    }

    pub fn open_record(&self) -> Option<&HistoryRecord> {
        self.open.as_ref()
    }

    fn open_mut(&mut self, record: RecordId) -> Result<&mut HistoryRecord, HistoryError> {
        match &mut self.open {
            Some(open) if open.id == record => Ok(open),
            Some(_) => Err(HistoryError::UnknownRecord(record)),
            None => Err(HistoryError::NotRecording),
        }
    }

    /// Capture the current contents of each region for undo. Call before
    /// mutating them.
    pub fn track_region(
        &mut self,
        record: RecordId,
        world: &mut World,
        regions: &[Region],
    ) -> Result<(), HistoryError> {
        for region in regions {
            self.capture_undo(record, world, region.clone())?;
        }
        Ok(())
    }

    /// Capture the blocks of `min..=max` selected by `filter` for undo.
    pub fn add_undo_structure(
        &mut self,
        record: RecordId,
        world: &mut World,
        min: BlockPos,
        max: BlockPos,
        filter: &BlockFilter,
    ) -> Result<(), HistoryError> {
        self.capture_undo(record, world, filter.region(min, max))
    }

    /// Capture the blocks of `min..=max` selected by `filter` for redo. Call
    /// after mutating them.
    pub fn add_redo_structure(
        &mut self,
        record: RecordId,
        world: &mut World,
        min: BlockPos,
        max: BlockPos,
        filter: &BlockFilter,
    ) -> Result<(), HistoryError> {
        self.open_mut(record)?;
        let entry = self.save(record, world, filter.region(min, max))?;
        self.open_mut(record)?.redo.push(entry);
        Ok(())
    }

    fn capture_undo(
        &mut self,
        record: RecordId,
        world: &mut World,
        region: Region,
    ) -> Result<(), HistoryError> {
        let limit = self.config.change_limit;
        let open = self.open_mut(record)?;
        let attempted = open.blocks_changed.saturating_add(region.volume());
        if let Some(limit) = limit {
            if attempted > limit {
                return Err(HistoryError::ChangeLimitExceeded { limit, attempted });
            }
        }
        open.blocks_changed = attempted;
        let entry = self.save(record, world, region)?;
        self.open_mut(record)?.undo.push(entry);
        Ok(())
    }

    /// Store a snapshot. A failed save rolls the record back.
    fn save(
        &mut self,
        record: RecordId,
        world: &mut World,
        region: Region,
    ) -> Result<HistoryEntry, HistoryError> {
        let location = region.bounds().map_or(BlockPos::ZERO, |(min, _)| min);
        match self.store.save(world, &region, self.config.capture) {
            Ok(token) => Ok(HistoryEntry {
                token,
                region,
                location,
            }),
            Err(err) => {
                tracing::warn!(record = %record, error = %err, "failed to save history");
                if let Err(rollback) = self.cancel(record, world) {
                    tracing::warn!(record = %record, error = %rollback, "rollback after failed save also failed");
                }
                Err(err.into())
            }
        }
    }

    /// Capture the session's selection. Called once before and optionally
    /// once after a selection change.
    pub fn record_selection(
        &mut self,
        record: RecordId,
        selection: &Selection,
    ) -> Result<(), HistoryError> {
        let open = self.open_mut(record)?;
        let next = match std::mem::take(&mut open.selection) {
            SelectionCapture::None => SelectionCapture::Once(selection.clone()),
            SelectionCapture::Once(before) => SelectionCapture::Twice(before, selection.clone()),
            twice @ SelectionCapture::Twice(..) => {
                open.selection = twice;
                return Err(HistoryError::SelectionAlreadyRecorded);
            }
        };
        open.selection = next;
        Ok(())
    }

    /// Finish the open record and push it onto the undo stack.
    ///
    /// Redo snapshots are taken now from the undo regions unless the caller
    /// captured some explicitly. Starts a new branch: the redo stack is
    /// dropped. The oldest records beyond the size limit are evicted.
    pub fn commit(&mut self, record: RecordId, world: &mut World) -> Result<(), HistoryError> {
        self.open_mut(record)?;
        let needs_redo = self
            .open
            .as_ref()
            .is_some_and(|open| open.redo.is_empty() && !open.undo.is_empty());
        if needs_redo {
            let regions: Vec<Region> = self
                .open
                .iter()
                .flat_map(|open| open.undo.iter().map(|entry| entry.region.clone()))
                .collect();
            for region in regions {
                let entry = self.save(record, world, region)?;
                self.open_mut(record)?.redo.push(entry);
            }
        }

        let Some(mut committed) = self.open.take() else {
            return Err(HistoryError::NotRecording);
        };
        committed.state = RecordState::Committed;
        let blocks = committed.blocks_changed;
        self.undo.push_back(committed);

        for dropped in std::mem::take(&mut self.redo) {
            self.release(&dropped);
        }
        while self.undo.len() > self.config.max_size.max(1) {
            if let Some(evicted) = self.undo.pop_front() {
                tracing::debug!(record = %evicted.id, "history record evicted");
                self.release(&evicted);
            }
        }
        tracing::info!(record = %record, blocks, undo = self.undo.len(), "history committed");
        Ok(())
    }

    /// Roll back the open record: restore its undo snapshots and discard it.
    ///
    /// Snapshots are restored newest first, so where captures overlap the
    /// earliest one, the true pre-edit state, is written last. Returns
    /// `false` if `record` is no longer open.
    pub fn cancel(&mut self, record: RecordId, world: &mut World) -> Result<bool, HistoryError> {
        match &self.open {
            Some(open) if open.id == record => {}
            _ => return Ok(false),
        }
        let Some(mut cancelled) = self.open.take() else {
            return Ok(false);
        };
        let _span = tracing::info_span!("history_cancel", record = %record).entered();
        let mut first_error = None;
        for entry in cancelled.undo.iter().rev() {
            if let Err(err) = self.store.load(entry.token, world, entry.location) {
                tracing::warn!(record = %record, token = %entry.token, error = %err, "rollback restore failed");
                first_error.get_or_insert(err);
            }
        }
        cancelled.state = RecordState::Cancelled;
        self.release(&cancelled);
        tracing::info!(record = %record, restored = cancelled.undo.len(), "history cancelled");
        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(true),
        }
    }

    /// Roll back whatever record is open.
    pub fn cancel_open(&mut self, world: &mut World) -> Result<bool, HistoryError> {
        match self.open.as_ref().map(HistoryRecord::id) {
            Some(id) => self.cancel(id, world),
            None => Ok(false),
        }
    }

    /// Revert the most recent committed record. `Ok(false)` when there is
    /// nothing to undo.
    pub fn undo(&mut self, world: &mut World, selection: &mut Selection) -> Result<bool, HistoryError> {
        self.ensure_not_recording()?;
        let Some(record) = self.undo.back() else {
            return Ok(false);
        };
        self.check_loaded(world, &record.undo)?;

        let snapshots = self.fetch_all(record.undo.iter().rev())?;

        let _span = tracing::info_span!("history_undo", record = %record.id).entered();
        apply_all(&snapshots, world)?;
        if let Some(before) = record.selection.before() {
            *selection = before.clone();
        }
        if let Some(record) = self.undo.pop_back() {
            tracing::info!(record = %record.id, "undo");
            self.redo.push(record);
        }
        Ok(true)
    }

    /// Re-apply the most recently undone record. `Ok(false)` when there is
    /// nothing to redo.
    pub fn redo(&mut self, world: &mut World, selection: &mut Selection) -> Result<bool, HistoryError> {
        self.ensure_not_recording()?;
        let Some(record) = self.redo.last() else {
            return Ok(false);
        };
        self.check_loaded(world, &record.redo)?;

        let snapshots = self.fetch_all(record.redo.iter())?;

        let _span = tracing::info_span!("history_redo", record = %record.id).entered();
        apply_all(&snapshots, world)?;
        if let Some(after) = record.selection.after() {
            *selection = after.clone();
        }
        if let Some(record) = self.redo.pop() {
            tracing::info!(record = %record.id, "redo");
            self.undo.push_back(record);
        }
        Ok(true)
    }

    /// Drop both stacks. Refused while a record is open.
    pub fn clear(&mut self) -> Result<(), HistoryError> {
        self.ensure_not_recording()?;
        let records: Vec<HistoryRecord> = self.undo.drain(..).chain(self.redo.drain(..)).collect();
        for record in &records {
            self.release(record);
        }
        tracing::info!(released = records.len(), "history cleared");
        Ok(())
    }

    /// Release every stored snapshot, including an open record's. The world
    /// is not touched; roll back first if it must be.
    pub fn delete_all(&mut self) {
        let records: Vec<HistoryRecord> = self
            .open
            .take()
            .into_iter()
            .chain(self.undo.drain(..))
            .chain(self.redo.drain(..))
            .collect();
        for record in &records {
            self.release(record);
        }
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Committed records, oldest first.
    pub fn undo_records(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.undo.iter()
    }

    /// Snapshots currently held by the store.
    pub fn stored_snapshots(&self) -> usize {
        self.store.len()
    }

    fn ensure_not_recording(&self) -> Result<(), HistoryError> {
        if self.is_recording() {
            Err(HistoryError::StillRecording)
        } else {
            Ok(())
        }
    }

    fn check_loaded(&self, world: &World, entries: &[HistoryEntry]) -> Result<(), HistoryError> {
        for entry in entries {
            let Some((min, max)) = self.store.bounds(entry.token) else {
                continue;
            };
            if !world.is_area_loaded(min, max) {
                return Err(HistoryError::RegionUnavailable { min, max });
            }
        }
        Ok(())
    }

    /// Read every snapshot up front so a bad entry fails before any write.
    fn fetch_all<'a>(
        &self,
        entries: impl Iterator<Item = &'a HistoryEntry>,
    ) -> Result<Vec<(RegionSnapshot, BlockPos)>, HistoryError> {
        entries
            .map(|entry| Ok((self.store.fetch(entry.token)?, entry.location)))
            .collect()
    }

    fn release(&mut self, record: &HistoryRecord) {
        let tokens: Vec<StructureToken> = record.tokens().collect();
        for token in tokens {
            self.store.delete(token);
        }
    }
}

fn apply_all(snapshots: &[(RegionSnapshot, BlockPos)], world: &mut World) -> Result<(), HistoryError> {
    for (snapshot, at) in snapshots {
        snapshot.restore(world, *at).map_err(StoreError::from)?;
    }
    Ok(())
}
