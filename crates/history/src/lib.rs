//! Edit history: per-session undo and redo stacks of snapshot records.
//!
//! # Invariants
//! - At most one record is open per manager at any time.
//! - Commit pushes onto the undo stack and drops the redo stack.
//! - Cancel restores every undo snapshot and never reaches either stack.
//! - Undo and redo check that every affected area is loaded before the
//!   first write.
//! - Snapshots of records that leave both stacks are released from the store.

mod manager;
mod record;

pub use manager::{HistoryConfig, HistoryError, HistoryManager};
pub use record::{BlockFilter, HistoryEntry, HistoryRecord, RecordId, RecordState};
