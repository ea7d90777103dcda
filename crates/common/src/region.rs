use serde::{Deserialize, Serialize};

use crate::types::BlockPos;

/// A set of block positions an edit touches.
///
/// Either an inclusive axis-aligned box or an explicit list of coordinates.
/// Both variants iterate in ascending `BlockPos` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    /// Inclusive box; `min <= max` component-wise.
    Box { min: BlockPos, max: BlockPos },
    /// Sorted, deduplicated coordinates.
    PointSet(Vec<BlockPos>),
}

impl Region {
    /// Box spanning two corners in any order.
    pub fn cuboid(a: BlockPos, b: BlockPos) -> Self {
        Self::Box {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Explicit coordinate set. Duplicates are dropped.
    pub fn points(points: impl IntoIterator<Item = BlockPos>) -> Self {
        let mut points: Vec<BlockPos> = points.into_iter().collect();
        points.sort_unstable();
        points.dedup();
        Self::PointSet(points)
    }

    /// Inclusive bounding box, or `None` for an empty point set.
    pub fn bounds(&self) -> Option<(BlockPos, BlockPos)> {
        match self {
            Self::Box { min, max } => Some((*min, *max)),
            Self::PointSet(points) => {
                let first = *points.first()?;
                Some(
                    points
                        .iter()
                        .fold((first, first), |(lo, hi), p| (lo.min(*p), hi.max(*p))),
                )
            }
        }
    }

    /// Number of block positions covered. Saturates at `u64::MAX`.
    pub fn volume(&self) -> u64 {
        match self {
            Self::Box { min, max } => {
                let extent = |lo: i32, hi: i32| u64::from(hi.abs_diff(lo)) + 1;
                extent(min.x, max.x)
                    .saturating_mul(extent(min.y, max.y))
                    .saturating_mul(extent(min.z, max.z))
            }
            Self::PointSet(points) => points.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::PointSet(points) if points.is_empty())
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        match self {
            Self::Box { min, max } => {
                pos.x >= min.x
                    && pos.x <= max.x
                    && pos.y >= min.y
                    && pos.y <= max.y
                    && pos.z >= min.z
                    && pos.z <= max.z
            }
            Self::PointSet(points) => points.binary_search(&pos).is_ok(),
        }
    }

    pub fn iter(&self) -> RegionIter<'_> {
        match self {
            Self::Box { min, max } => RegionIter::Box(CuboidIter::new(*min, *max)),
            Self::PointSet(points) => RegionIter::Points(points.iter()),
        }
    }
}

impl<'a> IntoIterator for &'a Region {
    type Item = BlockPos;
    type IntoIter = RegionIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the positions of a [`Region`].
#[derive(Debug, Clone)]
pub enum RegionIter<'a> {
    Box(CuboidIter),
    Points(std::slice::Iter<'a, BlockPos>),
}

impl Iterator for RegionIter<'_> {
    type Item = BlockPos;

    fn next(&mut self) -> Option<BlockPos> {
        match self {
            Self::Box(it) => it.next(),
            Self::Points(it) => it.next().copied(),
        }
    }
}

/// Owning iterator over the positions of a [`Region`].
#[derive(Debug, Clone)]
pub enum RegionIntoIter {
    Box(CuboidIter),
    Points(std::vec::IntoIter<BlockPos>),
}

impl IntoIterator for Region {
    type Item = BlockPos;
    type IntoIter = RegionIntoIter;

    fn into_iter(self) -> Self::IntoIter {
        match self {
            Self::Box { min, max } => RegionIntoIter::Box(CuboidIter::new(min, max)),
            Self::PointSet(points) => RegionIntoIter::Points(points.into_iter()),
        }
    }
}

impl Iterator for RegionIntoIter {
    type Item = BlockPos;

    fn next(&mut self) -> Option<BlockPos> {
        match self {
            Self::Box(it) => it.next(),
            Self::Points(it) => it.next(),
        }
    }
}

/// Walks an inclusive box in `(x, y, z)` lexicographic order.
#[derive(Debug, Clone)]
pub struct CuboidIter {
    min: BlockPos,
    max: BlockPos,
    next: Option<BlockPos>,
}

impl CuboidIter {
    pub fn new(min: BlockPos, max: BlockPos) -> Self {
        let empty = min.x > max.x || min.y > max.y || min.z > max.z;
        Self {
            min,
            max,
            next: (!empty).then_some(min),
        }
    }
}

impl Iterator for CuboidIter {
    type Item = BlockPos;

    fn next(&mut self) -> Option<BlockPos> {
        let current = self.next?;
        let BlockPos { x, y, z } = current;
        self.next = if z < self.max.z {
            Some(BlockPos::new(x, y, z + 1))
        } else if y < self.max.y {
            Some(BlockPos::new(x, y + 1, self.min.z))
        } else if x < self.max.x {
            Some(BlockPos::new(x + 1, self.min.y, self.min.z))
        } else {
            None
        };
        Some(current)
    }
}
