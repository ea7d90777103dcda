//! Shared types: block coordinates, blocks, regions, selections, ids.
//!
//! # Invariants
//! - `Region` iteration order is ascending `BlockPos` order for both variants.
//! - `Region::Box` corners are normalized (`min <= max`).

pub mod region;
pub mod selection;
pub mod types;

pub use region::{CuboidIter, Region, RegionIntoIter, RegionIter};
pub use selection::{SelectMode, Selection};
pub use types::{Block, BlockPos, EntityId, SessionId, Transform};
