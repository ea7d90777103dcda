//! World Kernel: the shared block world, entities, chunk loading, host ticks.
//!
//! # Invariants
//! - All state mutations flow through explicit operations and are logged.
//! - Reads and writes outside loaded chunk columns fail instead of loading.

pub mod world;

pub use world::{
    CHUNK_SIZE, ChunkCoord, EntityData, LoadPolicy, World, WorldError, WorldEvent,
};
