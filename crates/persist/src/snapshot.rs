use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};
use voxedit_common::{Block, BlockPos, EntityId, Region, Transform};
use voxedit_kernel::{World, WorldError};

/// What a capture includes besides blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Capture entities standing inside a box region.
    pub include_entities: bool,
}

/// A captured entity, positioned relative to the snapshot origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapturedEntity {
    pub id: EntityId,
    pub offset: Vec3,
    pub transform: Transform,
}

/// A copy of world contents for a box or an explicit block set.
///
/// Positions are stored relative to `origin` (the region's min corner) so the
/// snapshot can be restored at another location. The hash covers the block
/// payload and is checked by [`RegionSnapshot::verify`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSnapshot {
    pub region: Region,
    pub origin: BlockPos,
    /// One entry per region position, in region iteration order. `None` is air.
    pub blocks: Vec<(IVec3, Option<Block>)>,
    /// `Some` only when entities were captured.
    pub entities: Option<Vec<CapturedEntity>>,
    pub hash: u64,
}

/// Upper bound on the block buffer reserved up front by a capture.
const MAX_CAPACITY_HINT: usize = 1 << 16;

impl RegionSnapshot {
    /// Capture the current contents of `region`.
    ///
    /// Fails without capturing anything if any position is not loaded.
    pub fn capture(
        world: &World,
        region: &Region,
        options: CaptureOptions,
    ) -> Result<Self, WorldError> {
        let origin = region.bounds().map_or(BlockPos::ZERO, |(min, _)| min);
        let hint = usize::try_from(region.volume()).unwrap_or(usize::MAX);
        let mut blocks = Vec::with_capacity(hint.min(MAX_CAPACITY_HINT));
        for pos in region {
            let block = world.get_block(pos)?.cloned();
            blocks.push((pos.relative_to(origin), block));
        }

        let entities = match (options.include_entities, region) {
            (true, Region::Box { min, max }) => Some(
                world
                    .entities_in(*min, *max)
                    .into_iter()
                    .map(|(id, transform)| CapturedEntity {
                        id,
                        offset: transform.position - IVec3::from(origin).as_vec3(),
                        transform,
                    })
                    .collect(),
            ),
            _ => None,
        };

        let hash = payload_hash(&blocks);
        Ok(Self {
            region: region.clone(),
            origin,
            blocks,
            entities,
            hash,
        })
    }

    /// Verify the snapshot integrity by recomputing the hash.
    pub fn verify(&self) -> bool {
        self.hash == payload_hash(&self.blocks)
    }

    /// Absolute bounds the snapshot covers when restored at its origin.
    pub fn bounds(&self) -> Option<(BlockPos, BlockPos)> {
        self.region.bounds()
    }

    /// Bounds the snapshot covers when restored at `at`.
    pub fn bounds_at(&self, at: BlockPos) -> Option<(BlockPos, BlockPos)> {
        let shift = at.relative_to(self.origin);
        self.bounds()
            .map(|(min, max)| (min.offset(shift), max.offset(shift)))
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Write the captured contents back with the origin placed at `at`.
    ///
    /// Every target position is checked before the first write, so a restore
    /// into a partially unloaded area changes nothing.
    pub fn restore(&self, world: &mut World, at: BlockPos) -> Result<(), WorldError> {
        if let Some(unloaded) = self
            .blocks
            .iter()
            .map(|(offset, _)| at.offset(*offset))
            .find(|pos| !world.is_loaded(*pos))
        {
            return Err(WorldError::NotLoaded(unloaded));
        }

        for (offset, block) in &self.blocks {
            world.set_block(at.offset(*offset), block.clone())?;
        }

        if let (Some(entities), Some((min, max))) = (&self.entities, self.bounds_at(at)) {
            for (id, _) in world.entities_in(min, max) {
                world.despawn(id);
            }
            let base = IVec3::from(at).as_vec3();
            for captured in entities {
                let transform = Transform {
                    position: base + captured.offset,
                    ..captured.transform
                };
                world.spawn_with_id(captured.id, transform);
            }
        }
        Ok(())
    }
}

/// FNV-1a over the block payload.
fn payload_hash(blocks: &[(IVec3, Option<Block>)]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    let mut mix = |bytes: &[u8]| {
        for &b in bytes {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
    };
    for (offset, block) in blocks {
        mix(&offset.x.to_le_bytes());
        mix(&offset.y.to_le_bytes());
        mix(&offset.z.to_le_bytes());
        match block {
            Some(b) => {
                mix(&[1]);
                mix(b.id.as_bytes());
            }
            None => mix(&[0]),
        }
    }
    hash
}
