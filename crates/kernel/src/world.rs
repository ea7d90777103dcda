use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use voxedit_common::{Block, BlockPos, EntityId, Transform};

/// Horizontal edge length of a chunk column, in blocks.
pub const CHUNK_SIZE: i32 = 16;

/// Column coordinate of a chunk. Loading is tracked per column (all heights).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i32,
    pub z: i32,
}

impl ChunkCoord {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn containing(pos: BlockPos) -> Self {
        Self {
            x: pos.x.div_euclid(CHUNK_SIZE),
            z: pos.z.div_euclid(CHUNK_SIZE),
        }
    }

    /// Every column overlapping the horizontal extent of `[min, max]`.
    pub fn columns_between(min: BlockPos, max: BlockPos) -> impl Iterator<Item = ChunkCoord> {
        let lo = Self::containing(min.min(max));
        let hi = Self::containing(min.max(max));
        (lo.x..=hi.x).flat_map(move |x| (lo.z..=hi.z).map(move |z| ChunkCoord::new(x, z)))
    }
}

/// An event record produced by every mutation to the world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorldEvent {
    /// A block changed. `None` is air.
    BlockChanged {
        pos: BlockPos,
        old: Option<Block>,
        new: Option<Block>,
    },
    /// Entity was spawned with the given transform.
    Spawned { id: EntityId, transform: Transform },
    /// Entity was despawned. Carries the data it had.
    Despawned { id: EntityId, transform: Transform },
    /// A chunk column became available.
    ChunkLoaded(ChunkCoord),
    /// The host advanced one tick.
    Stepped { tick: u64 },
}

/// Errors from world access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    #[error("block at {0} is not loaded")]
    NotLoaded(BlockPos),
}

/// Per-entity data stored in the world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityData {
    pub transform: Transform,
}

/// How chunk columns become available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadPolicy {
    /// Every column is always loaded.
    Eager,
    /// Only explicitly loaded columns are available; queued requests are
    /// served at most `chunks_per_tick` per [`World::step`].
    Lazy { chunks_per_tick: usize },
}

/// The shared block world every edit mutates.
///
/// Sparse: air is the absence of an entry. Uses BTreeMap so iteration and
/// [`World::state_hash`] are deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    blocks: BTreeMap<BlockPos, Block>,
    entities: BTreeMap<EntityId, EntityData>,
    policy: LoadPolicy,
    loaded: BTreeSet<ChunkCoord>,
    load_queue: VecDeque<ChunkCoord>,
    tick: u64,
    #[serde(skip)]
    event_log: Vec<WorldEvent>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// An empty, fully loaded world at tick 0.
    pub fn new() -> Self {
        Self::with_policy(LoadPolicy::Eager)
    }

    /// An empty world where nothing is loaded until requested.
    pub fn lazy(chunks_per_tick: usize) -> Self {
        Self::with_policy(LoadPolicy::Lazy { chunks_per_tick })
    }

    pub fn with_policy(policy: LoadPolicy) -> Self {
        Self {
            blocks: BTreeMap::new(),
            entities: BTreeMap::new(),
            policy,
            loaded: BTreeSet::new(),
            load_queue: VecDeque::new(),
            tick: 0,
            event_log: Vec::new(),
        }
    }

    /// Current host tick.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Advance the host by one tick, serving queued chunk loads.
    pub fn step(&mut self) {
        self.tick += 1;
        if let LoadPolicy::Lazy { chunks_per_tick } = self.policy {
            for _ in 0..chunks_per_tick {
                let Some(coord) = self.load_queue.pop_front() else {
                    break;
                };
                self.mark_loaded(coord);
            }
        }
        self.event_log.push(WorldEvent::Stepped { tick: self.tick });
    }

    pub fn is_loaded(&self, pos: BlockPos) -> bool {
        match self.policy {
            LoadPolicy::Eager => true,
            LoadPolicy::Lazy { .. } => self.loaded.contains(&ChunkCoord::containing(pos)),
        }
    }

    pub fn is_area_loaded(&self, min: BlockPos, max: BlockPos) -> bool {
        match self.policy {
            LoadPolicy::Eager => true,
            LoadPolicy::Lazy { .. } => {
                ChunkCoord::columns_between(min, max).all(|c| self.loaded.contains(&c))
            }
        }
    }

    /// Queue every unloaded column of `[min, max]` for loading.
    /// Returns how many columns were newly queued.
    pub fn request_area(&mut self, min: BlockPos, max: BlockPos) -> usize {
        if self.policy == LoadPolicy::Eager {
            return 0;
        }
        let mut queued = 0;
        for coord in ChunkCoord::columns_between(min, max) {
            if !self.loaded.contains(&coord) && !self.load_queue.contains(&coord) {
                tracing::debug!(x = coord.x, z = coord.z, "queued chunk load");
                self.load_queue.push_back(coord);
                queued += 1;
            }
        }
        queued
    }

    /// Load every column of `[min, max]` immediately.
    pub fn load_area(&mut self, min: BlockPos, max: BlockPos) {
        for coord in ChunkCoord::columns_between(min, max) {
            self.load_queue.retain(|c| *c != coord);
            self.mark_loaded(coord);
        }
    }

    /// Drop a column from the loaded set. Its blocks are kept.
    pub fn unload_chunk(&mut self, coord: ChunkCoord) {
        self.loaded.remove(&coord);
    }

    pub fn pending_loads(&self) -> usize {
        self.load_queue.len()
    }

    fn mark_loaded(&mut self, coord: ChunkCoord) {
        if self.loaded.insert(coord) {
            self.event_log.push(WorldEvent::ChunkLoaded(coord));
        }
    }

    /// The block at `pos`; `Ok(None)` is air.
    pub fn get_block(&self, pos: BlockPos) -> Result<Option<&Block>, WorldError> {
        if !self.is_loaded(pos) {
            return Err(WorldError::NotLoaded(pos));
        }
        Ok(self.blocks.get(&pos))
    }

    /// Replace the block at `pos` (`None` clears it to air) and log the change.
    /// Returns the previous block.
    pub fn set_block(
        &mut self,
        pos: BlockPos,
        block: Option<Block>,
    ) -> Result<Option<Block>, WorldError> {
        if !self.is_loaded(pos) {
            return Err(WorldError::NotLoaded(pos));
        }
        let old = match &block {
            Some(b) => self.blocks.insert(pos, b.clone()),
            None => self.blocks.remove(&pos),
        };
        if old != block {
            self.event_log.push(WorldEvent::BlockChanged {
                pos,
                old: old.clone(),
                new: block,
            });
        }
        Ok(old)
    }

    /// Number of non-air blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Non-air blocks within the inclusive box, in ascending order.
    pub fn blocks_in(
        &self,
        min: BlockPos,
        max: BlockPos,
    ) -> impl Iterator<Item = (&BlockPos, &Block)> + '_ {
        let (lo, hi) = (min.min(max), min.max(max));
        self.blocks
            .range(lo..=hi)
            .filter(move |(p, _)| p.y >= lo.y && p.y <= hi.y && p.z >= lo.z && p.z <= hi.z)
    }

    /// Number of entities in the world.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Read-only access to all entities.
    pub fn entities(&self) -> &BTreeMap<EntityId, EntityData> {
        &self.entities
    }

    /// Entities whose position lies in the block box `[min, max]`.
    pub fn entities_in(&self, min: BlockPos, max: BlockPos) -> Vec<(EntityId, Transform)> {
        self.entities
            .iter()
            .filter(|(_, data)| {
                let p = BlockPos::containing(data.transform.position);
                p.x >= min.x
                    && p.x <= max.x
                    && p.y >= min.y
                    && p.y <= max.y
                    && p.z >= min.z
                    && p.z <= max.z
            })
            .map(|(id, data)| (*id, data.transform))
            .collect()
    }

    /// Spawn a new entity with the given transform. Returns its id.
    pub fn spawn(&mut self, transform: Transform) -> EntityId {
        let id = EntityId::new();
        self.spawn_with_id(id, transform);
        id
    }

    /// Spawn an entity with a specific id (used for restore).
    pub fn spawn_with_id(&mut self, id: EntityId, transform: Transform) {
        self.entities.insert(id, EntityData { transform });
        self.event_log.push(WorldEvent::Spawned { id, transform });
    }

    /// Remove an entity. Returns the data if it existed.
    pub fn despawn(&mut self, id: EntityId) -> Option<EntityData> {
        let data = self.entities.remove(&id);
        if let Some(ref d) = data {
            self.event_log.push(WorldEvent::Despawned {
                id,
                transform: d.transform,
            });
        }
        data
    }

    pub fn get_entity(&self, id: EntityId) -> Option<&EntityData> {
        self.entities.get(&id)
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.event_log)
    }

    /// Read-only access to the event log.
    pub fn events(&self) -> &[WorldEvent] {
        &self.event_log
    }

    /// Deterministic hash of block and entity contents (tick excluded).
    pub fn state_hash(&self) -> u64 {
        let mut h = Fnv::new();
        for (pos, block) in &self.blocks {
            h.pos(*pos);
            h.write(block.id.as_bytes());
        }
        for (id, data) in &self.entities {
            h.write(id.0.as_bytes());
            let t = data.transform;
            for f in t.position.to_array() {
                h.write(&f.to_le_bytes());
            }
            for f in t.rotation.to_array() {
                h.write(&f.to_le_bytes());
            }
            for f in t.scale.to_array() {
                h.write(&f.to_le_bytes());
            }
        }
        h.finish()
    }

    /// Deterministic hash of the blocks inside `[min, max]`.
    pub fn area_hash(&self, min: BlockPos, max: BlockPos) -> u64 {
        let mut h = Fnv::new();
        for (pos, block) in self.blocks_in(min, max) {
            h.pos(*pos);
            h.write(block.id.as_bytes());
        }
        h.finish()
    }
}

/// FNV-1a accumulator.
struct Fnv(u64);

impl Fnv {
    fn new() -> Self {
        Self(0xcbf2_9ce4_8422_2325)
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(0x0100_0000_01b3);
        }
        // Separator so adjacent fields cannot alias.
        self.0 ^= 0xff;
        self.0 = self.0.wrapping_mul(0x0100_0000_01b3);
    }

    fn pos(&mut self, pos: BlockPos) {
        self.write(&pos.x.to_le_bytes());
        self.write(&pos.y.to_le_bytes());
        self.write(&pos.z.to_le_bytes());
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stone() -> Block {
        Block::new("stone")
    }

    #[test]
    fn world_starts_empty() {
        let w = World::new();
        assert_eq!(w.tick(), 0);
        assert_eq!(w.block_count(), 0);
        assert_eq!(w.entity_count(), 0);
    }

    #[test]
    fn set_and_get_block() {
        let mut w = World::new();
        let p = BlockPos::new(1, 2, 3);
        assert_eq!(w.set_block(p, Some(stone())).unwrap(), None);
        assert_eq!(w.get_block(p).unwrap(), Some(&stone()));
        assert_eq!(w.set_block(p, None).unwrap(), Some(stone()));
        assert_eq!(w.get_block(p).unwrap(), None);
    }

    #[test]
    fn unchanged_write_is_not_logged() {
        let mut w = World::new();
        let p = BlockPos::ZERO;
        w.set_block(p, Some(stone())).unwrap();
        w.set_block(p, Some(stone())).unwrap();
        assert_eq!(w.events().len(), 1);
    }

    #[test]
    fn lazy_world_rejects_unloaded_access() {
        let mut w = World::lazy(1);
        let p = BlockPos::new(40, 0, 40);
        assert_eq!(w.get_block(p), Err(WorldError::NotLoaded(p)));
        assert!(w.set_block(p, Some(stone())).is_err());
    }

    #[test]
    fn requested_chunks_load_over_ticks() {
        let mut w = World::lazy(1);
        let min = BlockPos::new(0, 0, 0);
        let max = BlockPos::new(31, 10, 0);
        assert_eq!(w.request_area(min, max), 2);
        // Requesting again does not double-queue.
        assert_eq!(w.request_area(min, max), 0);

        w.step();
        assert!(!w.is_area_loaded(min, max));
        w.step();
        assert!(w.is_area_loaded(min, max));
        assert_eq!(w.pending_loads(), 0);
    }

    #[test]
    fn chunk_coord_handles_negative_positions() {
        assert_eq!(
            ChunkCoord::containing(BlockPos::new(-1, 0, -16)),
            ChunkCoord::new(-1, -1)
        );
        assert_eq!(
            ChunkCoord::containing(BlockPos::new(15, 0, 16)),
            ChunkCoord::new(0, 1)
        );
    }

    #[test]
    fn blocks_in_filters_to_box() {
        let mut w = World::new();
        w.set_block(BlockPos::new(0, 0, 0), Some(stone())).unwrap();
        w.set_block(BlockPos::new(0, 5, 0), Some(stone())).unwrap();
        w.set_block(BlockPos::new(1, 0, 9), Some(stone())).unwrap();
        let inside: Vec<_> = w
            .blocks_in(BlockPos::new(0, 0, 0), BlockPos::new(1, 1, 1))
            .map(|(p, _)| *p)
            .collect();
        assert_eq!(inside, vec![BlockPos::new(0, 0, 0)]);
    }

    #[test]
    fn entities_in_box() {
        let mut w = World::new();
        let inside = w.spawn(Transform::at(glam::Vec3::new(0.5, 0.5, 0.5)));
        w.spawn(Transform::at(glam::Vec3::new(10.0, 0.0, 0.0)));
        let found = w.entities_in(BlockPos::ZERO, BlockPos::new(1, 1, 1));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, inside);
    }

    #[test]
    fn state_hash_tracks_contents() {
        let mut w1 = World::new();
        let mut w2 = World::new();
        w1.set_block(BlockPos::ZERO, Some(stone())).unwrap();
        w2.set_block(BlockPos::ZERO, Some(stone())).unwrap();
        assert_eq!(w1.state_hash(), w2.state_hash());

        w2.set_block(BlockPos::ZERO, Some(Block::new("dirt"))).unwrap();
        assert_ne!(w1.state_hash(), w2.state_hash());
    }

    #[test]
    fn step_increments_tick() {
        let mut w = World::new();
        w.step();
        w.step();
        assert_eq!(w.tick(), 2);
    }
}
