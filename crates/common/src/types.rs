use glam::{IVec3, Quat, Vec3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Integer block coordinate in the world.
///
/// Ordered lexicographically by `(x, y, z)` so block maps can use `BTreeMap`
/// and iterate deterministically.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const ZERO: Self = Self::new(0, 0, 0);

    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Component-wise minimum.
    pub fn min(self, other: Self) -> Self {
        IVec3::from(self).min(other.into()).into()
    }

    /// Component-wise maximum.
    pub fn max(self, other: Self) -> Self {
        IVec3::from(self).max(other.into()).into()
    }

    /// Translate by `offset`.
    pub fn offset(self, offset: IVec3) -> Self {
        (IVec3::from(self) + offset).into()
    }

    /// Vector from `origin` to `self`.
    pub fn relative_to(self, origin: Self) -> IVec3 {
        IVec3::from(self) - IVec3::from(origin)
    }

    /// Center of the block in continuous world space.
    pub fn center(self) -> Vec3 {
        IVec3::from(self).as_vec3() + Vec3::splat(0.5)
    }

    /// The block containing a continuous world-space position.
    pub fn containing(position: Vec3) -> Self {
        position.floor().as_ivec3().into()
    }
}

impl From<IVec3> for BlockPos {
    fn from(v: IVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl From<BlockPos> for IVec3 {
    fn from(p: BlockPos) -> Self {
        IVec3::new(p.x, p.y, p.z)
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A placed block. Air is represented by the absence of a block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
}

impl Block {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

/// Unique identifier for an entity in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-user editing session key. Scheduler and history state are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.8}", self.0.to_string())
    }
}

/// Spatial transform: position, rotation, scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_uniqueness() {
        let a = EntityId::new();
        let b = EntityId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn session_id_uniqueness() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn block_pos_min_max() {
        let a = BlockPos::new(1, 5, -3);
        let b = BlockPos::new(4, -2, 0);
        assert_eq!(a.min(b), BlockPos::new(1, -2, -3));
        assert_eq!(a.max(b), BlockPos::new(4, 5, 0));
    }

    #[test]
    fn block_pos_ordering_is_lexicographic() {
        let mut v = vec![
            BlockPos::new(1, 0, 0),
            BlockPos::new(0, 2, 0),
            BlockPos::new(0, 0, 3),
        ];
        v.sort();
        assert_eq!(
            v,
            vec![
                BlockPos::new(0, 0, 3),
                BlockPos::new(0, 2, 0),
                BlockPos::new(1, 0, 0),
            ]
        );
    }

    #[test]
    fn containing_floors_negative_coordinates() {
        let p = BlockPos::containing(Vec3::new(-0.5, 1.9, 2.0));
        assert_eq!(p, BlockPos::new(-1, 1, 2));
    }

    #[test]
    fn transform_default_is_identity() {
        let t = Transform::default();
        assert_eq!(t.position, Vec3::ZERO);
        assert_eq!(t.rotation, Quat::IDENTITY);
        assert_eq!(t.scale, Vec3::ONE);
    }
}
