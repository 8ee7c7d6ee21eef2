//! Per-procedure analysis context
//!
//! Owns everything that outlives a single environment snapshot: the program,
//! the checker's lattice, the options, the storage-location arena and the
//! lazily built CFGs of inlined callees. Environments borrow the context.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::ast::{FunctionId, Program, Type};
use crate::cfg::{Cfg, CfgBuilder};
use crate::config::DataflowOptions;
use crate::lattice::Lattice;
use crate::storage::{Entity, LocationArena, StorageLocation};

pub struct DataflowContext<L: Lattice> {
    program: Arc<Program>,
    lattice: L,
    options: DataflowOptions,
    arena: RefCell<LocationArena>,
    cfgs: RefCell<HashMap<FunctionId, Rc<Cfg>>>,
}

impl<L: Lattice> DataflowContext<L> {
    pub fn new(program: Arc<Program>, lattice: L, options: DataflowOptions) -> Self {
        Self {
            program,
            lattice,
            options,
            arena: RefCell::new(LocationArena::new()),
            cfgs: RefCell::new(HashMap::new()),
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn lattice(&self) -> &L {
        &self.lattice
    }

    pub fn options(&self) -> &DataflowOptions {
        &self.options
    }

    /// CFG of `function`, built on first request; `None` without a body
    pub fn cfg_for(&self, function: FunctionId) -> Option<Rc<Cfg>> {
        if let Some(cfg) = self.cfgs.borrow().get(&function) {
            return Some(Rc::clone(cfg));
        }
        let cfg = Rc::new(CfgBuilder::new(&self.program, function).build()?);
        self.cfgs.borrow_mut().insert(function, Rc::clone(&cfg));
        Some(cfg)
    }

    // Arena access. Each call holds the RefCell borrow only for its own duration.

    pub(crate) fn allocate(&self, entity: Entity, depth: usize, ty: &Type, global: bool) -> StorageLocation {
        self.arena.borrow_mut().get_or_create(entity, depth, ty, global)
    }

    pub(crate) fn lookup(&self, entity: Entity, depth: usize, global: bool) -> Option<StorageLocation> {
        self.arena.borrow().lookup(entity, depth, global)
    }

    pub fn location_type(&self, loc: StorageLocation) -> Type {
        self.arena.borrow().ty(loc)
    }

    pub fn location_depth(&self, loc: StorageLocation) -> Option<usize> {
        self.arena.borrow().info(loc).map(|info| info.depth)
    }

    pub fn is_global(&self, loc: StorageLocation) -> bool {
        self.arena.borrow().is_global(loc)
    }

    pub fn field(&self, loc: StorageLocation, name: &str) -> Option<StorageLocation> {
        self.arena.borrow().field(loc, name)
    }

    pub fn fields(&self, loc: StorageLocation) -> Vec<(String, StorageLocation)> {
        self.arena.borrow().fields(loc)
    }

    pub fn with_descendants(&self, loc: StorageLocation) -> Vec<StorageLocation> {
        self.arena.borrow().with_descendants(loc)
    }

    /// Number of storage locations allocated so far
    pub fn location_count(&self) -> usize {
        self.arena.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::RecordType;
    use crate::domains::flat::ConstantPropagation;

    #[test]
    fn test_cfg_cached_per_function() {
        let mut p = Program::new();
        let one = p.int(1);
        let f = p.define_function("f", vec![], Type::Void, vec![one]);
        let ext = p.declare_function("ext", vec![], Type::Void);
        let ctx = DataflowContext::new(Arc::new(p), ConstantPropagation, DataflowOptions::default());

        let first = ctx.cfg_for(f).unwrap();
        let second = ctx.cfg_for(f).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert!(ctx.cfg_for(ext).is_none());
    }

    #[test]
    fn test_record_locations_have_fields() {
        let pair = Type::Record(RecordType::new("Pair", vec![("a", Type::Int), ("b", Type::Bool)]));
        let mut p = Program::new();
        let v = p.local("v", pair.clone());
        let ctx = DataflowContext::new(Arc::new(p), ConstantPropagation, DataflowOptions::default());

        let loc = ctx.allocate(Entity::Decl(v), 0, &pair, false);
        assert_eq!(ctx.allocate(Entity::Decl(v), 0, &pair, false), loc);
        let a = ctx.field(loc, "a").unwrap();
        assert_eq!(ctx.location_type(a), Type::Int);
        assert_eq!(ctx.with_descendants(loc).len(), 3);
        assert_eq!(ctx.location_depth(a), Some(0));
        assert!(!ctx.is_global(loc));
        assert_eq!(ctx.location_count(), 3);
    }
}
