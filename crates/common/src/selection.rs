use serde::{Deserialize, Serialize};

use crate::region::Region;
use crate::types::BlockPos;

/// How the second selection point behaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectMode {
    /// Two independent corners.
    #[default]
    Cuboid,
    /// The first point anchors; every further point grows the box to include it.
    Extend,
}

/// A session's cursor selection. History records capture and restore it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub mode: SelectMode,
    points: Vec<BlockPos>,
}

impl Selection {
    pub fn new(mode: SelectMode) -> Self {
        Self {
            mode,
            points: Vec::new(),
        }
    }

    pub fn points(&self) -> &[BlockPos] {
        &self.points
    }

    /// Set corner `index` (0 or 1).
    pub fn set(&mut self, index: usize, pos: BlockPos) {
        match (self.mode, index) {
            (_, 0) => {
                if self.mode == SelectMode::Extend {
                    self.points = vec![pos, pos];
                } else if self.points.is_empty() {
                    self.points.push(pos);
                } else {
                    self.points[0] = pos;
                }
            }
            (SelectMode::Cuboid, _) => {
                if self.points.is_empty() {
                    self.points.push(pos);
                }
                if self.points.len() < 2 {
                    self.points.push(pos);
                } else {
                    self.points[1] = pos;
                }
            }
            (SelectMode::Extend, _) => match self.points.as_slice() {
                [] => self.points = vec![pos, pos],
                &[a] => self.points = vec![a.min(pos), a.max(pos)],
                &[a, b, ..] => self.points = vec![a.min(b).min(pos), a.max(b).max(pos)],
            },
        }
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Selected box, once both corners are set.
    pub fn region(&self) -> Option<Region> {
        match self.points.as_slice() {
            [a, b, ..] => Some(Region::cuboid(*a, *b)),
            _ => None,
        }
    }

    pub fn volume(&self) -> u64 {
        self.region().map_or(0, |r| r.volume())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cuboid_needs_two_points() {
        let mut sel = Selection::default();
        sel.set(0, BlockPos::new(0, 0, 0));
        assert!(sel.region().is_none());
        sel.set(1, BlockPos::new(2, 2, 2));
        assert_eq!(sel.volume(), 27);
    }

    #[test]
    fn extend_mode_grows_box() {
        let mut sel = Selection::new(SelectMode::Extend);
        sel.set(0, BlockPos::new(0, 0, 0));
        sel.set(1, BlockPos::new(3, 0, 0));
        sel.set(1, BlockPos::new(0, 0, -2));
        assert_eq!(
            sel.region(),
            Some(Region::cuboid(BlockPos::new(0, 0, -2), BlockPos::new(3, 0, 0)))
        );
    }

    #[test]
    fn extend_mode_keeps_anchor_and_corner_inside() {
        let mut sel = Selection::new(SelectMode::Extend);
        sel.set(1, BlockPos::new(5, 5, 5));
        assert_eq!(sel.points(), &[BlockPos::new(5, 5, 5), BlockPos::new(5, 5, 5)]);
        sel.set(1, BlockPos::new(2, 7, 5));
        sel.set(1, BlockPos::new(4, 6, 5));
        assert_eq!(sel.points(), &[BlockPos::new(2, 5, 5), BlockPos::new(5, 7, 5)]);
        assert_eq!(sel.volume(), 4 * 3);

        sel.set(0, BlockPos::new(-1, 0, 0));
        assert_eq!(sel.volume(), 1);
    }

    #[test]
    fn clear_drops_points() {
        let mut sel = Selection::default();
        sel.set(0, BlockPos::ZERO);
        sel.set(1, BlockPos::ZERO);
        sel.clear();
        assert!(sel.points().is_empty());
    }
}
