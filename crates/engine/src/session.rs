use voxedit_common::{Selection, SessionId};
use voxedit_history::{HistoryConfig, HistoryManager};
use voxedit_jobs::JobId;
use voxedit_persist::{CompressedStructureStore, MemoryStructureStore, StructureStore};

/// One user's editing state: selection and history.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    name: String,
    pub selection: Selection,
    pub(crate) history: HistoryManager,
    /// The job that opened the currently open record, if a job did.
    pub(crate) record_owner: Option<JobId>,
    /// Ticks left before a departed session is deleted.
    pub(crate) pending_deletion: Option<u64>,
}

impl Session {
    pub(crate) fn new(name: String, history: HistoryConfig, compress: bool) -> Self {
        let store: Box<dyn StructureStore> = if compress {
            Box::new(CompressedStructureStore::default())
        } else {
            Box::new(MemoryStructureStore::new())
        };
        Self {
            id: SessionId::new(),
            name,
            selection: Selection::default(),
            history: HistoryManager::new(store, history),
            record_owner: None,
            pending_deletion: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryManager {
        &mut self.history
    }

    /// Whether the user is connected.
    pub fn is_active(&self) -> bool {
        self.pending_deletion.is_none()
    }

    pub fn pending_deletion(&self) -> Option<u64> {
        self.pending_deletion
    }
}
