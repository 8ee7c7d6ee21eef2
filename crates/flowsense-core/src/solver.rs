//! Worklist-based fixpoint solver over one function's CFG
//!
//! Blocks are visited in reverse postorder first; a block whose exit
//! environment changes re-queues its successors. The environment entering a
//! block is the join of its predecessors' exits, each narrowed by the branch
//! condition of its edge. Edges whose condition cannot hold are dropped.
//! Loop heads switch from join to widening once the lattice's delay is used
//! up.

use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, trace, warn};

use crate::ast::{DeclId, StmtId};
use crate::cfg::{BlockId, Cfg};
use crate::context::DataflowContext;
use crate::environment::Environment;
use crate::error::TransferError;
use crate::lattice::{Lattice, Value};
use crate::stmt_env::{BlockStmtEnvs, StmtToEnvMap};
use crate::transfer::{assume, transfer};

/// Result of fixpoint computation
pub struct FixpointResult<'c, L: Lattice> {
    /// Environment at entry of each reached block
    pub block_entries: IndexMap<BlockId, Environment<'c, L>>,
    /// Environment at exit of each reached block
    pub block_exits: IndexMap<BlockId, Environment<'c, L>>,
    /// Environment right after every element of every reached block
    pub stmt_envs: BlockStmtEnvs<'c, L>,
    /// Number of block visits
    pub iterations: usize,
    /// `false` when the visit budget ran out before a fixpoint was reached
    pub converged: bool,
    exit: BlockId,
}

impl<'c, L: Lattice> FixpointResult<'c, L> {
    /// Environment on function exit; `None` if no return is reachable
    pub fn exit_environment(&self) -> Option<&Environment<'c, L>> {
        self.block_exits.get(&self.exit)
    }

    pub fn environment_after(&self, stmt: StmtId) -> Option<&Environment<'c, L>> {
        self.stmt_envs.environment(stmt)
    }

    /// Value of a variable on function exit (⊥ if the exit is unreachable)
    pub fn exit_value(&self, decl: DeclId) -> Value<L::Value> {
        self.exit_environment()
            .map_or(Value::Bottom, |env| env.decl_value(decl))
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.block_entries.contains_key(&block)
    }
}

/// Worklist-based fixpoint solver
pub struct FixpointSolver<'c, L: Lattice> {
    ctx: &'c DataflowContext<L>,
}

impl<'c, L: Lattice> FixpointSolver<'c, L> {
    pub fn new(ctx: &'c DataflowContext<L>) -> Self {
        Self { ctx }
    }

    /// Compute the fixpoint of `cfg` starting from `initial` at its entry
    pub fn solve(&self, cfg: &Cfg, initial: Environment<'c, L>) -> Result<FixpointResult<'c, L>, TransferError> {
        let max_visits = self.ctx.options().max_block_visits;
        let widening_delay = self.ctx.lattice().widening_delay();
        let loop_heads = cfg.loop_heads();

        let mut block_entries: IndexMap<BlockId, Environment<'c, L>> = IndexMap::new();
        let mut block_exits: IndexMap<BlockId, Environment<'c, L>> = IndexMap::new();
        let mut stmt_envs = BlockStmtEnvs::new(cfg);
        let mut head_visits: HashMap<BlockId, usize> = HashMap::new();

        // Initialize worklist with blocks in reverse postorder
        let mut worklist: VecDeque<BlockId> = cfg.reverse_postorder().into_iter().collect();
        let mut in_worklist: HashSet<BlockId> = worklist.iter().copied().collect();

        let mut iterations = 0;
        let mut converged = true;

        while let Some(block_id) = worklist.pop_front() {
            in_worklist.remove(&block_id);
            if iterations >= max_visits {
                warn!(
                    function = %self.ctx.program().function(cfg.function).name,
                    max_visits,
                    "block visit budget exhausted before reaching a fixpoint"
                );
                converged = false;
                break;
            }
            iterations += 1;

            let Some(mut input) = self.block_input(cfg, block_id, &initial, &block_exits) else {
                trace!(block = block_id.0, "no feasible predecessor yet");
                continue;
            };

            if loop_heads.contains(&block_id) {
                let visits = head_visits.entry(block_id).or_insert(0);
                *visits += 1;
                if let (Some(delay), Some(previous)) = (widening_delay, block_entries.get(&block_id)) {
                    if *visits > delay {
                        trace!(block = block_id.0, visits = *visits, "widening at loop head");
                        input = previous.join(&input).widen(previous);
                    }
                }
            }

            // Apply transfer function element by element
            let block = cfg.block(block_id);
            let mut env = input.clone();
            let mut snapshots = Vec::with_capacity(block.elements.len());
            for &stmt in &block.elements {
                transfer(&stmt_envs, stmt, &mut env)?;
                snapshots.push(env.clone());
            }
            stmt_envs.record_block(block_id, snapshots);
            block_entries.insert(block_id, input);

            // Check if output changed
            let changed = block_exits.get(&block_id) != Some(&env);
            if changed {
                block_exits.insert(block_id, env);

                // Add successors to worklist
                for &succ_id in &block.successors {
                    if in_worklist.insert(succ_id) {
                        worklist.push_back(succ_id);
                    }
                }
            }
        }

        debug!(
            function = %self.ctx.program().function(cfg.function).name,
            blocks = cfg.len(),
            iterations,
            converged,
            "fixpoint computed"
        );

        Ok(FixpointResult {
            block_entries,
            block_exits,
            stmt_envs,
            iterations,
            converged,
            exit: cfg.exit,
        })
    }

    /// Join of the predecessor exits that can actually flow into `block`
    fn block_input(
        &self,
        cfg: &Cfg,
        block: BlockId,
        initial: &Environment<'c, L>,
        block_exits: &IndexMap<BlockId, Environment<'c, L>>,
    ) -> Option<Environment<'c, L>> {
        let mut input = (block == cfg.entry).then(|| initial.clone());
        for &pred in &cfg.block(block).predecessors {
            let Some(out) = block_exits.get(&pred) else {
                continue;
            };
            let mut edge_env = out.fork();
            if let Some((condition, holds)) = cfg.edge_condition(pred, block) {
                if !assume(condition, &mut edge_env, holds) {
                    trace!(from = pred.0, to = block.0, "infeasible edge");
                    continue;
                }
            }
            input = Some(match input {
                Some(acc) => acc.join(&edge_env),
                None => edge_env,
            });
        }
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Program, Type};
    use crate::cfg::CfgBuilder;
    use crate::config::DataflowOptions;
    use crate::domains::flat::{Constant, ConstantPropagation};
    use crate::domains::Const;
    use std::sync::Arc;

    #[test]
    fn test_solve_straight_line() {
        let mut p = Program::new();
        let x = p.local("x", Type::Int);
        let one = p.int(1);
        let decl = p.declare(x, Some(one));
        let xr = p.var(x);
        let two = p.int(2);
        let add = p.compound_assign(BinaryOp::Add, xr, two);
        let f = p.define_function("f", vec![], Type::Void, vec![decl, add]);
        let ctx = DataflowContext::new(Arc::new(p), ConstantPropagation, DataflowOptions::default());
        let cfg = ctx.cfg_for(f).unwrap();

        let result = FixpointSolver::new(&ctx)
            .solve(&cfg, Environment::for_function(&ctx, f))
            .unwrap();
        assert!(result.converged);
        assert_eq!(result.exit_value(x), Value::scalar(Constant::Value(Const::Int(3))));
        let after_decl = result.environment_after(decl).unwrap();
        assert_eq!(after_decl.decl_value(x), Value::scalar(Constant::Value(Const::Int(1))));
    }

    #[test]
    fn test_infeasible_branch_not_reached() {
        let mut p = Program::new();
        let x = p.local("x", Type::Int);
        let y = p.local("y", Type::Int);
        let zero = p.int(0);
        let decl_x = p.declare(x, Some(zero));
        let zero_y = p.int(0);
        let decl_y = p.declare(y, Some(zero_y));
        let xr = p.var(x);
        let zero_c = p.int(0);
        let cond = p.binary(BinaryOp::Ne, xr, zero_c);
        let yr = p.var(y);
        let one = p.int(1);
        let set = p.assign(yr, one);
        let stmt = p.if_stmt(cond, vec![set], vec![]);
        let f = p.define_function("f", vec![], Type::Void, vec![decl_x, decl_y, stmt]);
        let program = Arc::new(p);
        let cfg = CfgBuilder::new(&program, f).build().unwrap();
        let ctx = DataflowContext::new(Arc::clone(&program), ConstantPropagation, DataflowOptions::default());

        let result = FixpointSolver::new(&ctx)
            .solve(&cfg, Environment::for_function(&ctx, f))
            .unwrap();
        assert!(result.environment_after(set).is_none());
        assert_eq!(result.exit_value(y), Value::scalar(Constant::Value(Const::Int(0))));
    }

    #[test]
    fn test_visit_budget_reports_non_convergence() {
        let mut p = Program::new();
        let i = p.local("i", Type::Int);
        let zero = p.int(0);
        let decl = p.declare(i, Some(zero));
        let ir = p.var(i);
        let ten = p.int(10);
        let cond = p.binary(BinaryOp::Lt, ir, ten);
        let ir2 = p.var(i);
        let one = p.int(1);
        let inc = p.compound_assign(BinaryOp::Add, ir2, one);
        let body = p.while_stmt(cond, vec![inc]);
        let f = p.define_function("f", vec![], Type::Void, vec![decl, body]);
        let options = DataflowOptions {
            max_block_visits: 2,
            ..DataflowOptions::default()
        };
        let ctx = DataflowContext::new(Arc::new(p), ConstantPropagation, options);
        let cfg = ctx.cfg_for(f).unwrap();

        let result = FixpointSolver::new(&ctx)
            .solve(&cfg, Environment::for_function(&ctx, f))
            .unwrap();
        assert!(!result.converged);
        assert_eq!(result.iterations, 2);
    }
}
