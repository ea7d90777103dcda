use voxedit_common::{Block, Region, RegionIntoIter};
use voxedit_history::RecordId;
use voxedit_jobs::{BodyError, JobBody, Step};

use crate::workspace::{EditContext, EditContextExt, Workspace};

/// Blocks a fill writes per step.
pub const DEFAULT_BLOCKS_PER_STEP: usize = 256;

/// Phases a [`FillBody`] reports: saving history, then generating blocks.
pub const FILL_PHASES: u32 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum FillMode {
    /// Every position becomes this block (`None` is air).
    Set(Option<Block>),
    /// Positions holding `from` become `to`.
    Replace {
        from: Option<Block>,
        to: Option<Block>,
    },
}

impl FillMode {
    fn target(&self, current: Option<&Block>) -> Option<Option<Block>> {
        match self {
            Self::Set(block) => Some(block.clone()),
            Self::Replace { from, to } => (current == from.as_ref()).then(|| to.clone()),
        }
    }
}

/// Writes a region a slice at a time inside one history record.
///
/// The first step waits for the region to load, opens the record and
/// snapshots the region. Later steps write blocks; the last one commits.
/// The output is the number of blocks that actually changed.
#[derive(Debug)]
pub struct FillBody {
    region: Region,
    mode: FillMode,
    blocks_per_step: usize,
    record: Option<RecordId>,
    cursor: Option<RegionIntoIter>,
    total: u64,
    visited: u64,
    changed: u64,
}

impl FillBody {
    pub fn new(region: Region, mode: FillMode) -> Self {
        let total = region.volume();
        Self {
            region,
            mode,
            blocks_per_step: DEFAULT_BLOCKS_PER_STEP,
            record: None,
            cursor: None,
            total,
            visited: 0,
            changed: 0,
        }
    }

    pub fn with_blocks_per_step(mut self, blocks: usize) -> Self {
        self.blocks_per_step = blocks.max(1);
        self
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    fn begin(&mut self, cx: &mut EditContext<'_>) -> Result<Step<u64>, BodyError> {
        let Some((min, max)) = self.region.bounds() else {
            return Ok(Step::Done(0));
        };
        if let Some(park) = cx.park_until_loaded(min, max) {
            return Ok(park);
        }
        cx.next_step("Saving history");
        let mut scope = cx.edit()?;
        let record = scope.record()?;
        self.record = Some(record);
        scope.track(record, std::slice::from_ref(&self.region))?;
        cx.next_step("Generating blocks");
        self.cursor = Some(self.region.clone().into_iter());
        Ok(Step::Continue)
    }
}

impl JobBody<Workspace> for FillBody {
    type Output = u64;

    fn step(&mut self, cx: &mut EditContext<'_>) -> Result<Step<u64>, BodyError> {
        let (Some(cursor), Some(record)) = (self.cursor.as_mut(), self.record) else {
            return self.begin(cx);
        };

        let mut exhausted = false;
        {
            let mut scope = cx.edit()?;
            let world = scope.world();
            for _ in 0..self.blocks_per_step {
                let Some(pos) = cursor.next() else {
                    exhausted = true;
                    break;
                };
                self.visited += 1;
                let Some(block) = self.mode.target(world.get_block(pos)?) else {
                    continue;
                };
                if world.set_block(pos, block.clone())? != block {
                    self.changed += 1;
                }
            }
            if exhausted {
                scope.commit(record)?;
            }
        }

        if exhausted {
            tracing::debug!(job = %cx.id(), changed = self.changed, "fill committed");
            return Ok(Step::Done(self.changed));
        }
        cx.set_progress(self.visited as f32 / self.total.max(1) as f32);
        Ok(Step::Yield)
    }
}
