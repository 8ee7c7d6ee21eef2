//! One-call entry point: analyse a single function from scratch

use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::info;

use crate::ast::{FunctionId, Program};
use crate::config::DataflowOptions;
use crate::context::DataflowContext;
use crate::environment::Environment;
use crate::lattice::Lattice;
use crate::solver::{FixpointResult, FixpointSolver};

/// Forward dataflow analysis of one function under a checker's lattice
pub struct DataflowAnalysis<L: Lattice> {
    ctx: DataflowContext<L>,
    function: FunctionId,
}

impl<L: Lattice> DataflowAnalysis<L> {
    pub fn new(program: Arc<Program>, function: FunctionId, lattice: L, options: DataflowOptions) -> Result<Self> {
        let Some(info) = program.functions().find(|(id, _)| *id == function).map(|(_, f)| f) else {
            bail!("unknown function {:?}", function);
        };
        if info.body.is_none() {
            bail!("function `{}` has no body to analyse", info.name);
        }
        Ok(Self {
            ctx: DataflowContext::new(program, lattice, options),
            function,
        })
    }

    /// Look the function up by name
    pub fn for_name(program: Arc<Program>, name: &str, lattice: L, options: DataflowOptions) -> Result<Self> {
        let Some(function) = program.function_by_name(name) else {
            bail!("no function named `{}`", name);
        };
        Self::new(program, function, lattice, options)
    }

    pub fn context(&self) -> &DataflowContext<L> {
        &self.ctx
    }

    pub fn function(&self) -> FunctionId {
        self.function
    }

    /// Solve to a fixpoint from the function's initial environment
    pub fn run(&self) -> Result<FixpointResult<'_, L>> {
        let name = &self.ctx.program().function(self.function).name;
        let Some(cfg) = self.ctx.cfg_for(self.function) else {
            bail!("function `{}` has no body to analyse", name);
        };
        let initial = Environment::for_function(&self.ctx, self.function);
        let result = FixpointSolver::new(&self.ctx)
            .solve(&cfg, initial)
            .map_err(|e| anyhow::anyhow!("Dataflow analysis of `{}` failed: {}", name, e))?;
        info!(
            function = %name,
            iterations = result.iterations,
            converged = result.converged,
            locations = self.ctx.location_count(),
            "dataflow analysis finished"
        );
        Ok(result)
    }
}
