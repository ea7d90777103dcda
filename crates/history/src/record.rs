use voxedit_common::{BlockPos, Region, Selection};
use voxedit_persist::StructureToken;

/// Identifies one history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub u64);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordState {
    Open,
    Committed,
    Cancelled,
}

/// Which blocks of a box an explicit capture covers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BlockFilter {
    /// Every block in the box.
    #[default]
    Any,
    /// Only the listed positions.
    Only(Vec<BlockPos>),
}

impl BlockFilter {
    /// The region a capture of `min..=max` with this filter covers.
    pub fn region(&self, min: BlockPos, max: BlockPos) -> Region {
        match self {
            Self::Any => Region::cuboid(min, max),
            Self::Only(points) => Region::points(points.iter().copied()),
        }
    }
}

/// One stored snapshot and where it goes back.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub token: StructureToken,
    pub region: Region,
    /// Restore location: the region's min corner.
    pub location: BlockPos,
}

/// Selection captures of a record: before, and after a selection change.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) enum SelectionCapture {
    #[default]
    None,
    Once(Selection),
    Twice(Selection, Selection),
}

impl SelectionCapture {
    pub(crate) fn before(&self) -> Option<&Selection> {
        match self {
            Self::None => None,
            Self::Once(sel) | Self::Twice(sel, _) => Some(sel),
        }
    }

    pub(crate) fn after(&self) -> Option<&Selection> {
        match self {
            Self::None => None,
            Self::Once(sel) | Self::Twice(_, sel) => Some(sel),
        }
    }
}

/// One undo/redo transaction.
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub(crate) id: RecordId,
    pub(crate) undo: Vec<HistoryEntry>,
    pub(crate) redo: Vec<HistoryEntry>,
    pub(crate) selection: SelectionCapture,
    pub(crate) blocks_changed: u64,
    pub(crate) state: RecordState,
}

impl HistoryRecord {
    pub(crate) fn open(id: RecordId) -> Self {
        Self {
            id,
            undo: Vec::new(),
            redo: Vec::new(),
            selection: SelectionCapture::None,
            blocks_changed: 0,
            state: RecordState::Open,
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    /// Snapshots taken before mutation, in capture order.
    pub fn undo_entries(&self) -> &[HistoryEntry] {
        &self.undo
    }

    /// Snapshots of the post-mutation state, in capture order.
    pub fn redo_entries(&self) -> &[HistoryEntry] {
        &self.redo
    }

    pub fn selection_before(&self) -> Option<&Selection> {
        self.selection.before()
    }

    pub fn selection_after(&self) -> Option<&Selection> {
        self.selection.after()
    }

    /// Blocks covered by undo captures so far.
    pub fn blocks_changed(&self) -> u64 {
        self.blocks_changed
    }

    pub(crate) fn tokens(&self) -> impl Iterator<Item = StructureToken> + '_ {
        self.undo.iter().chain(&self.redo).map(|entry| entry.token)
    }
}
