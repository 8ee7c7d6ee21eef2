//! Cross-block lookup of "the environment right after statement S"
//!
//! `&&`, `||` and `?:` have their operands in different blocks from the
//! expression itself, so the transfer function cannot read operand results
//! off its running environment. It asks a [`StmtToEnvMap`] instead. An
//! absent answer is normal (unreachable operand, block not processed yet)
//! and is consumed as "unknown", never as an error.

use indexmap::IndexMap;

use crate::ast::StmtId;
use crate::cfg::{BlockId, Cfg};
use crate::environment::Environment;
use crate::lattice::Lattice;

pub trait StmtToEnvMap<'c, L: Lattice> {
    /// Environment immediately after `stmt` was evaluated, if known
    fn environment(&self, stmt: StmtId) -> Option<&Environment<'c, L>>;
}

/// Map that knows nothing; for transferring statements outside any solver run
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyStmtEnvMap;

impl<'c, L: Lattice> StmtToEnvMap<'c, L> for EmptyStmtEnvMap {
    fn environment(&self, _stmt: StmtId) -> Option<&Environment<'c, L>> {
        None
    }
}

/// Hand-built index, e.g. for checkers replaying a path
impl<'c, L: Lattice> StmtToEnvMap<'c, L> for IndexMap<StmtId, Environment<'c, L>> {
    fn environment(&self, stmt: StmtId) -> Option<&Environment<'c, L>> {
        self.get(&stmt)
    }
}

/// Per-statement snapshots recorded block by block during a solver run.
///
/// Each block's snapshots are replaced wholesale when the block is processed
/// again, so a lookup into a block not yet revisited in the current
/// iteration returns the previous iteration's snapshot.
pub struct BlockStmtEnvs<'c, L: Lattice> {
    positions: IndexMap<StmtId, (BlockId, usize)>,
    snapshots: Vec<Option<Vec<Environment<'c, L>>>>,
}

impl<'c, L: Lattice> BlockStmtEnvs<'c, L> {
    pub fn new(cfg: &Cfg) -> Self {
        Self {
            positions: cfg.element_positions(),
            snapshots: vec![None; cfg.len()],
        }
    }

    /// Replace the snapshots of `block`, one per element in order
    pub fn record_block(&mut self, block: BlockId, snapshots: Vec<Environment<'c, L>>) {
        if let Some(slot) = self.snapshots.get_mut(block.0) {
            *slot = Some(snapshots);
        }
    }

    pub fn block_snapshots(&self, block: BlockId) -> Option<&[Environment<'c, L>]> {
        self.snapshots.get(block.0)?.as_deref()
    }

    /// Block and index of `stmt`, if the CFG holds it as an element
    pub fn position(&self, stmt: StmtId) -> Option<(BlockId, usize)> {
        self.positions.get(&stmt).copied()
    }

    /// Number of statements with a recorded snapshot
    pub fn len(&self) -> usize {
        self.positions.keys().filter(|s| StmtToEnvMap::environment(self, **s).is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'c, L: Lattice> StmtToEnvMap<'c, L> for BlockStmtEnvs<'c, L> {
    fn environment(&self, stmt: StmtId) -> Option<&Environment<'c, L>> {
        let (block, index) = self.position(stmt)?;
        self.block_snapshots(block)?.get(index)
    }
}
