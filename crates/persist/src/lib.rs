//! Region snapshots: capture and restore of block (and entity) contents.
//!
//! # Invariants
//! - A capture either covers every position of its region or fails.
//! - A restore checks every target position before the first write.
//! - Snapshots are integrity-checked before they are written back.

pub mod snapshot;
pub mod store;

pub use snapshot::{CaptureOptions, CapturedEntity, RegionSnapshot};
pub use store::{
    CompressedStructureStore, MemoryStructureStore, StoreError, StructureStore, StructureToken,
};
