//! Symbolic store threaded through the transfer function
//!
//! An [`Environment`] maps declarations and expressions to storage locations
//! and locations to [`Value`]s. Every map sits behind an `Rc` and is cloned
//! on first write (`Rc::make_mut`), so forking a snapshot is cheap and
//! mutating a fork never shows through in the snapshot it came from.
//!
//! Location identity lives in the context's arena and is keyed by entity
//! and call depth, so the same variable maps to the same location in every
//! snapshot of one analysis run.

use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use crate::ast::{DeclId, FunctionId, Program, StmtId, Type};
use crate::context::DataflowContext;
use crate::error::FrameError;
use crate::lattice::{Aggregate, Lattice, Truth, Value};
use crate::storage::{Entity, StorageLocation};

/// Caller bindings saved while an inlined callee runs
#[derive(Debug, Clone, PartialEq)]
struct Frame {
    callee: FunctionId,
    saved_decls: IndexMap<DeclId, StorageLocation>,
    saved_exprs: IndexMap<StmtId, StorageLocation>,
}

pub struct Environment<'c, L: Lattice> {
    ctx: &'c DataflowContext<L>,
    decl_to_loc: Rc<IndexMap<DeclId, StorageLocation>>,
    expr_to_loc: Rc<IndexMap<StmtId, StorageLocation>>,
    loc_to_val: Rc<IndexMap<StorageLocation, Value<L::Value>>>,
    live: Rc<BTreeSet<StorageLocation>>,
    address_taken: Rc<BTreeSet<StorageLocation>>,
    escaped: Rc<BTreeSet<StorageLocation>>,
    call_stack: Rc<Vec<Frame>>,
}

impl<'c, L: Lattice> Environment<'c, L> {
    /// Empty environment: nothing bound, nothing live
    pub fn new(ctx: &'c DataflowContext<L>) -> Self {
        Self {
            ctx,
            decl_to_loc: Rc::default(),
            expr_to_loc: Rc::default(),
            loc_to_val: Rc::default(),
            live: Rc::default(),
            address_taken: Rc::default(),
            escaped: Rc::default(),
            call_stack: Rc::default(),
        }
    }

    /// Initial environment for analysing `function`: globals and parameters
    /// get locations holding an explicit ⊤.
    ///
    /// Explicit, not unassigned: a one-sided value survives a join, so a
    /// parameter narrowed on one path must still meet ⊤ from the other.
    pub fn for_function(ctx: &'c DataflowContext<L>, function: FunctionId) -> Self {
        let mut env = Self::new(ctx);
        let program = ctx.program();
        let inputs = program
            .globals()
            .map(|(decl, _)| decl)
            .chain(program.function(function).params.iter().copied());
        for decl in inputs {
            let loc = env.get_or_create_storage_location(Entity::Decl(decl), &program.decl(decl).ty);
            env.havoc(loc);
        }
        env
    }

    pub fn context(&self) -> &'c DataflowContext<L> {
        self.ctx
    }

    pub fn program(&self) -> &'c Program {
        self.ctx.program()
    }

    pub fn lattice(&self) -> &'c L {
        self.ctx.lattice()
    }

    /// Number of inlined frames above the analysed function
    pub fn depth(&self) -> usize {
        self.call_stack.len()
    }

    /// Innermost inlined callee, `None` in the analysed function itself
    pub fn current_callee(&self) -> Option<FunctionId> {
        self.call_stack.last().map(|frame| frame.callee)
    }

    /// Location of `entity` in the current frame, allocated on first reference
    pub fn get_or_create_storage_location(&mut self, entity: Entity, ty: &Type) -> StorageLocation {
        let depth = self.depth();
        let loc = match entity {
            Entity::Decl(decl) => {
                if let Some(&loc) = self.decl_to_loc.get(&decl) {
                    return loc;
                }
                let global = self.program().decl(decl).is_global();
                let loc = self.ctx.allocate(entity, depth, ty, global);
                Rc::make_mut(&mut self.decl_to_loc).insert(decl, loc);
                loc
            }
            Entity::Expr(stmt) => {
                if let Some(&loc) = self.expr_to_loc.get(&stmt) {
                    return loc;
                }
                let loc = self.ctx.allocate(entity, depth, ty, false);
                Rc::make_mut(&mut self.expr_to_loc).insert(stmt, loc);
                loc
            }
            Entity::ReturnSlot => self.ctx.allocate(entity, depth, ty, false),
        };
        self.mark_live(loc);
        loc
    }

    /// Location bound to `entity` in this snapshot, without allocating
    pub fn storage_location(&self, entity: Entity) -> Option<StorageLocation> {
        match entity {
            Entity::Decl(decl) => self.decl_to_loc.get(&decl).copied(),
            Entity::Expr(stmt) => self.expr_to_loc.get(&stmt).copied(),
            Entity::ReturnSlot => self
                .ctx
                .lookup(Entity::ReturnSlot, self.depth(), false)
                .filter(|loc| self.live.contains(loc)),
        }
    }

    /// The expression's own location, as opposed to the place an lvalue
    /// expression may currently be bound to; rebinds `stmt` to it
    pub fn expr_storage_location(&mut self, stmt: StmtId, ty: &Type) -> StorageLocation {
        let loc = self.ctx.allocate(Entity::Expr(stmt), self.depth(), ty, false);
        self.set_storage_location(stmt, loc);
        loc
    }

    /// Bind an expression to an existing location (lvalues share the
    /// location of the place they designate)
    pub fn set_storage_location(&mut self, stmt: StmtId, loc: StorageLocation) {
        if self.expr_to_loc.get(&stmt) != Some(&loc) {
            Rc::make_mut(&mut self.expr_to_loc).insert(stmt, loc);
        }
        self.mark_live(loc);
    }

    fn mark_live(&mut self, loc: StorageLocation) {
        if self.live.contains(&loc) {
            return;
        }
        let live = Rc::make_mut(&mut self.live);
        live.extend(self.ctx.with_descendants(loc));
    }

    pub fn is_live(&self, loc: StorageLocation) -> bool {
        self.live.contains(&loc)
    }

    pub fn live_locations(&self) -> impl Iterator<Item = StorageLocation> + '_ {
        self.live.iter().copied()
    }

    /// Current value at `loc`; ⊤ if never assigned
    pub fn value(&self, loc: StorageLocation) -> Value<L::Value> {
        self.loc_to_val.get(&loc).cloned().unwrap_or(Value::Top)
    }

    pub fn set_value(&mut self, loc: StorageLocation, value: Value<L::Value>) {
        if self.loc_to_val.get(&loc) != Some(&value) {
            Rc::make_mut(&mut self.loc_to_val).insert(loc, value);
        }
        self.mark_live(loc);
    }

    /// Forget the values at `loc` and its fields; they read as ⊤ again
    pub fn clear_value(&mut self, loc: StorageLocation) {
        let locs = self.ctx.with_descendants(loc);
        if locs.iter().any(|l| self.loc_to_val.contains_key(l)) {
            let values = Rc::make_mut(&mut self.loc_to_val);
            for l in locs {
                values.shift_remove(&l);
            }
        }
    }

    /// Value of `loc` as seen by an rvalue read: records read as aggregates
    /// of their field locations
    pub fn load(&self, loc: StorageLocation) -> Value<L::Value> {
        if self.ctx.location_type(loc).is_record() {
            Value::Aggregate(Aggregate {
                fields: self.ctx.fields(loc).into_iter().collect(),
            })
        } else {
            self.value(loc)
        }
    }

    /// Strong update. Records copy field by field from an aggregate source;
    /// any other value stored into a record sends its fields to ⊤.
    pub fn store(&mut self, loc: StorageLocation, value: Value<L::Value>) {
        let fields = self.ctx.fields(loc);
        if fields.is_empty() {
            self.set_value(loc, value);
            return;
        }
        let Value::Aggregate(source) = value else {
            self.havoc(loc);
            return;
        };
        for (name, dst) in fields {
            match source.fields.get(&name) {
                Some(&src) => {
                    let v = self.load(src);
                    self.store(dst, v);
                }
                None => self.havoc(dst),
            }
        }
    }

    /// Weak update: joins `value` into what `loc` may already hold
    pub fn store_weak(&mut self, loc: StorageLocation, value: Value<L::Value>) {
        let fields = self.ctx.fields(loc);
        if fields.is_empty() {
            let joined = self.value(loc).join(&value);
            self.set_value(loc, joined);
            return;
        }
        let Value::Aggregate(source) = value else {
            self.havoc(loc);
            return;
        };
        for (name, dst) in fields {
            match source.fields.get(&name) {
                Some(&src) => {
                    let v = self.load(src);
                    self.store_weak(dst, v);
                }
                None => self.havoc(dst),
            }
        }
    }

    /// Send `loc` and all of its fields to ⊤
    pub fn havoc(&mut self, loc: StorageLocation) {
        for l in self.ctx.with_descendants(loc) {
            self.set_value(l, Value::Top);
        }
    }

    pub fn decl_value(&self, decl: DeclId) -> Value<L::Value> {
        self.decl_to_loc
            .get(&decl)
            .map_or(Value::Top, |loc| self.load(*loc))
    }

    pub fn expr_value(&self, stmt: StmtId) -> Value<L::Value> {
        self.expr_to_loc
            .get(&stmt)
            .map_or(Value::Top, |loc| self.load(*loc))
    }

    /// Whether a value has been recorded for `stmt` in this snapshot
    pub fn has_expr(&self, stmt: StmtId) -> bool {
        self.expr_to_loc.contains_key(&stmt)
    }

    /// Field location of a record location
    pub fn child(&self, loc: StorageLocation, field: &str) -> Option<StorageLocation> {
        self.ctx.field(loc, field)
    }

    /// Truth of a value used as a condition
    pub fn truth(&self, value: &Value<L::Value>) -> Truth {
        match value {
            Value::Scalar(v) => self.lattice().truth(v),
            Value::Pointer(p) => p.truth(),
            _ => Truth::Unknown,
        }
    }

    pub fn mark_address_taken(&mut self, loc: StorageLocation) {
        if !self.address_taken.contains(&loc) {
            Rc::make_mut(&mut self.address_taken).extend(self.ctx.with_descendants(loc));
        }
    }

    pub fn is_address_taken(&self, loc: StorageLocation) -> bool {
        self.address_taken.contains(&loc)
    }

    pub fn address_taken(&self) -> impl Iterator<Item = StorageLocation> + '_ {
        self.address_taken.iter().copied()
    }

    pub fn mark_escaped(&mut self, locs: impl IntoIterator<Item = StorageLocation>) {
        let new: Vec<_> = locs.into_iter().filter(|l| !self.escaped.contains(l)).collect();
        if !new.is_empty() {
            Rc::make_mut(&mut self.escaped).extend(new);
        }
    }

    pub fn is_escaped(&self, loc: StorageLocation) -> bool {
        self.escaped.contains(&loc)
    }

    pub fn escaped(&self) -> impl Iterator<Item = StorageLocation> + '_ {
        self.escaped.iter().copied()
    }

    /// Every live location reachable by following pointers out of `values`
    pub fn reachable_from(&self, values: &[Value<L::Value>]) -> BTreeSet<StorageLocation> {
        let mut work = Vec::new();
        for value in values {
            self.pointees(value, &mut work);
        }
        let mut seen = BTreeSet::new();
        while let Some(loc) = work.pop() {
            for l in self.ctx.with_descendants(loc) {
                // stale pointers into popped frames
                if !self.live.contains(&l) {
                    continue;
                }
                if seen.insert(l) {
                    let v = self.value(l);
                    self.pointees(&v, &mut work);
                }
            }
        }
        seen
    }

    /// Global locations, fields included, bound in this snapshot
    pub fn live_globals(&self) -> impl Iterator<Item = StorageLocation> + '_ {
        self.live.iter().copied().filter(|loc| self.ctx.is_global(*loc))
    }

    /// Non-global locations other code can reach without being handed a
    /// pointer: escaped locations and everything the current values of
    /// globals and escaped locations point to
    pub fn exposed_locations(&self) -> BTreeSet<StorageLocation> {
        let roots: Vec<Value<L::Value>> = self
            .live
            .iter()
            .filter(|loc| self.ctx.is_global(**loc) || self.escaped.contains(*loc))
            .map(|loc| self.value(*loc))
            .collect();
        let mut exposed = self.reachable_from(&roots);
        exposed.extend(self.escaped.iter().copied().filter(|loc| self.live.contains(loc)));
        exposed.retain(|loc| !self.ctx.is_global(*loc));
        exposed
    }

    fn pointees(&self, value: &Value<L::Value>, out: &mut Vec<StorageLocation>) {
        match value {
            Value::Pointer(p) => out.extend(p.targets.iter().copied()),
            // A record passed by value: its fields are copied, but pointers
            // stored in them still lead somewhere
            Value::Aggregate(agg) => {
                for loc in agg.fields.values() {
                    let v = self.load(*loc);
                    self.pointees(&v, out);
                }
            }
            _ => {}
        }
    }

    /// Independent copy; shares storage only until either side writes
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Location-wise join of two environments reaching the same point.
    ///
    /// Locations live on only one side are dropped along with any binding
    /// to them. A value assigned on only one side is kept as is.
    pub fn join(&self, other: &Self) -> Self {
        let live: BTreeSet<StorageLocation> = self.live.intersection(&other.live).copied().collect();

        let decl_to_loc: IndexMap<DeclId, StorageLocation> = self
            .decl_to_loc
            .iter()
            .filter(|(decl, loc)| other.decl_to_loc.get(*decl) == Some(*loc) && live.contains(*loc))
            .map(|(decl, loc)| (*decl, *loc))
            .collect();
        let expr_to_loc: IndexMap<StmtId, StorageLocation> = self
            .expr_to_loc
            .iter()
            .filter(|(stmt, loc)| other.expr_to_loc.get(*stmt) == Some(*loc) && live.contains(*loc))
            .map(|(stmt, loc)| (*stmt, *loc))
            .collect();

        let mut values = IndexMap::new();
        for loc in &live {
            let joined = match (self.loc_to_val.get(loc), other.loc_to_val.get(loc)) {
                (Some(a), Some(b)) => a.join(b),
                (Some(v), None) | (None, Some(v)) => v.clone(),
                (None, None) => continue,
            };
            values.insert(*loc, joined);
        }

        Self {
            ctx: self.ctx,
            decl_to_loc: Rc::new(decl_to_loc),
            expr_to_loc: Rc::new(expr_to_loc),
            loc_to_val: Rc::new(values),
            live: Rc::new(live),
            address_taken: Rc::new(self.address_taken.union(&other.address_taken).copied().collect()),
            escaped: Rc::new(self.escaped.union(&other.escaped).copied().collect()),
            call_stack: Rc::clone(&self.call_stack),
        }
    }

    /// Widen this (new) environment against the `previous` iterate at the
    /// same loop head
    pub fn widen(&self, previous: &Self) -> Self {
        let mut out = self.clone();
        if Rc::ptr_eq(&out.loc_to_val, &previous.loc_to_val) {
            return out;
        }
        let values = Rc::make_mut(&mut out.loc_to_val);
        for (loc, value) in values.iter_mut() {
            if let Some(prev) = previous.loc_to_val.get(loc) {
                *value = prev.widen(value);
            }
        }
        out
    }

    /// Enter an inlined call of `callee`, binding its parameters to `args`.
    ///
    /// Caller bindings (other than globals) are saved and hidden until the
    /// matching [`Environment::pop_frame`].
    pub fn push_frame(&mut self, callee: FunctionId, args: &[Value<L::Value>]) -> Result<(), FrameError> {
        let limit = self.ctx.options().context_sensitivity.max_depth;
        if self.depth() >= limit {
            return Err(FrameError::RecursionLimitExceeded { callee, limit });
        }

        let program = self.program();
        let saved_decls = (*self.decl_to_loc).clone();
        let saved_exprs = (*self.expr_to_loc).clone();
        let globals: IndexMap<DeclId, StorageLocation> = saved_decls
            .iter()
            .filter(|(decl, _)| program.decl(**decl).is_global())
            .map(|(decl, loc)| (*decl, *loc))
            .collect();
        self.decl_to_loc = Rc::new(globals);
        self.expr_to_loc = Rc::default();
        Rc::make_mut(&mut self.call_stack).push(Frame {
            callee,
            saved_decls,
            saved_exprs,
        });

        let function = program.function(callee);
        for (i, param) in function.params.iter().enumerate() {
            let loc = self.get_or_create_storage_location(Entity::Decl(*param), &program.decl(*param).ty);
            match args.get(i) {
                Some(arg) => self.store(loc, arg.clone()),
                None => self.clear_value(loc),
            }
        }
        let ret = self.get_or_create_storage_location(Entity::ReturnSlot, &function.ret_ty);
        for loc in self.ctx.with_descendants(ret) {
            self.set_value(loc, Value::Bottom);
        }
        Ok(())
    }

    /// Leave the innermost inlined call and return its return value
    /// (⊥ if no return statement stored one).
    ///
    /// Callee locals are no longer live, address-taken or escaped afterwards;
    /// the return slot stays so an aggregate result can still be copied out
    /// of it.
    pub fn pop_frame(&mut self) -> Result<Value<L::Value>, FrameError> {
        let depth = self.depth();
        let ret_loc = self.storage_location(Entity::ReturnSlot);
        let ret = self.return_value();

        let Some(frame) = Rc::make_mut(&mut self.call_stack).pop() else {
            return Err(FrameError::EmptyCallStack);
        };
        self.decl_to_loc = Rc::new(frame.saved_decls);
        self.expr_to_loc = Rc::new(frame.saved_exprs);

        let keep: BTreeSet<StorageLocation> = ret_loc
            .map(|loc| self.ctx.with_descendants(loc).into_iter().collect())
            .unwrap_or_default();
        let dead: Vec<StorageLocation> = self
            .live
            .iter()
            .copied()
            .filter(|loc| {
                !keep.contains(loc)
                    && !self.ctx.is_global(*loc)
                    && self.ctx.location_depth(*loc).is_some_and(|d| d >= depth)
            })
            .collect();
        if !dead.is_empty() {
            let live = Rc::make_mut(&mut self.live);
            for loc in &dead {
                live.remove(loc);
            }
            let values = Rc::make_mut(&mut self.loc_to_val);
            for loc in &dead {
                values.shift_remove(loc);
            }
            if dead.iter().any(|loc| self.address_taken.contains(loc)) {
                let taken = Rc::make_mut(&mut self.address_taken);
                for loc in &dead {
                    taken.remove(loc);
                }
            }
            if dead.iter().any(|loc| self.escaped.contains(loc)) {
                let escaped = Rc::make_mut(&mut self.escaped);
                for loc in &dead {
                    escaped.remove(loc);
                }
            }
        }
        Ok(ret)
    }

    /// Return slot of the current frame, allocated on first use
    pub fn return_location(&mut self, ty: &Type) -> StorageLocation {
        self.get_or_create_storage_location(Entity::ReturnSlot, ty)
    }

    /// Value stored by the current frame's return statements; ⊥ if none ran
    pub fn return_value(&self) -> Value<L::Value> {
        self.storage_location(Entity::ReturnSlot)
            .map_or(Value::Bottom, |loc| self.load(loc))
    }
}

impl<L: Lattice> Clone for Environment<'_, L> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx,
            decl_to_loc: Rc::clone(&self.decl_to_loc),
            expr_to_loc: Rc::clone(&self.expr_to_loc),
            loc_to_val: Rc::clone(&self.loc_to_val),
            live: Rc::clone(&self.live),
            address_taken: Rc::clone(&self.address_taken),
            escaped: Rc::clone(&self.escaped),
            call_stack: Rc::clone(&self.call_stack),
        }
    }
}

/// Equality ignores the context: snapshots are only compared within one run
impl<L: Lattice> PartialEq for Environment<'_, L> {
    fn eq(&self, other: &Self) -> bool {
        self.decl_to_loc == other.decl_to_loc
            && self.expr_to_loc == other.expr_to_loc
            && self.loc_to_val == other.loc_to_val
            && self.live == other.live
            && self.address_taken == other.address_taken
            && self.escaped == other.escaped
            && self.call_stack == other.call_stack
    }
}

impl<L: Lattice> fmt::Debug for Environment<'_, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("depth", &self.depth())
            .field("decls", &self.decl_to_loc)
            .field("values", &self.loc_to_val)
            .field("address_taken", &self.address_taken)
            .field("escaped", &self.escaped)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::RecordType;
    use crate::config::DataflowOptions;
    use crate::domains::value_set::{PossibleValues, ValueSet};
    use crate::domains::Const;
    use crate::lattice::PointsTo;
    use std::sync::Arc;

    fn ints(values: &[i64]) -> Value<ValueSet> {
        Value::scalar(ValueSet::of(values.iter().map(|n| Const::Int(*n))))
    }

    fn context(program: Program, options: DataflowOptions) -> DataflowContext<PossibleValues> {
        DataflowContext::new(Arc::new(program), PossibleValues, options)
    }

    #[test]
    fn test_unassigned_reads_top() {
        let mut p = Program::new();
        let x = p.local("x", Type::Int);
        let ctx = context(p, DataflowOptions::default());
        let mut env = Environment::new(&ctx);
        let loc = env.get_or_create_storage_location(Entity::Decl(x), &Type::Int);
        assert_eq!(env.value(loc), Value::Top);
        assert_eq!(env.get_or_create_storage_location(Entity::Decl(x), &Type::Int), loc);
    }

    #[test]
    fn test_copy_on_write_snapshots() {
        let mut p = Program::new();
        let x = p.local("x", Type::Int);
        let ctx = context(p, DataflowOptions::default());
        let mut env = Environment::new(&ctx);
        let loc = env.get_or_create_storage_location(Entity::Decl(x), &Type::Int);
        env.set_value(loc, ints(&[1]));

        let snapshot = env.fork();
        env.set_value(loc, ints(&[2]));
        assert_eq!(snapshot.value(loc), ints(&[1]));
        assert_eq!(env.value(loc), ints(&[2]));
    }

    #[test]
    fn test_join_location_wise() {
        let mut p = Program::new();
        let x = p.local("x", Type::Int);
        let y = p.local("y", Type::Int);
        let ctx = context(p, DataflowOptions::default());
        let mut base = Environment::new(&ctx);
        let lx = base.get_or_create_storage_location(Entity::Decl(x), &Type::Int);
        base.set_value(lx, ints(&[1]));

        let mut left = base.fork();
        left.set_value(lx, ints(&[2]));
        let mut right = base.fork();
        right.set_value(lx, ints(&[3]));
        // y only exists on the right path
        let ly = right.get_or_create_storage_location(Entity::Decl(y), &Type::Int);
        right.set_value(ly, ints(&[7]));

        let joined = left.join(&right);
        assert_eq!(joined.value(lx), ints(&[2, 3]));
        assert!(!joined.is_live(ly));
        assert_eq!(joined.storage_location(Entity::Decl(y)), None);
        assert_eq!(joined, right.join(&left));
        assert_eq!(joined.join(&joined), joined);
    }

    #[test]
    fn test_join_keeps_one_sided_value() {
        let mut p = Program::new();
        let x = p.local("x", Type::Int);
        let ctx = context(p, DataflowOptions::default());
        let mut base = Environment::new(&ctx);
        let lx = base.get_or_create_storage_location(Entity::Decl(x), &Type::Int);
        let mut assigned = base.fork();
        assigned.set_value(lx, ints(&[4]));
        assert_eq!(base.join(&assigned).value(lx), ints(&[4]));
    }

    #[test]
    fn test_record_store_copies_fields() {
        let point = Type::Record(RecordType::new("Point", vec![("x", Type::Int), ("y", Type::Int)]));
        let mut p = Program::new();
        let a = p.local("a", point.clone());
        let b = p.local("b", point.clone());
        let ctx = context(p, DataflowOptions::default());
        let mut env = Environment::new(&ctx);
        let la = env.get_or_create_storage_location(Entity::Decl(a), &point);
        let lb = env.get_or_create_storage_location(Entity::Decl(b), &point);
        let ax = env.child(la, "x").unwrap();
        env.set_value(ax, ints(&[5]));

        let value = env.load(la);
        env.store(lb, value);
        let bx = env.child(lb, "x").unwrap();
        assert_eq!(env.value(bx), ints(&[5]));

        env.set_value(ax, ints(&[6]));
        assert_eq!(env.value(bx), ints(&[5]));

        env.store(lb, Value::Top);
        assert_eq!(env.value(bx), Value::Top);
    }

    #[test]
    fn test_reachable_follows_pointer_chains() {
        let mut p = Program::new();
        let x = p.local("x", Type::Int);
        let px = p.local("px", Type::pointer_to(Type::Int));
        let ctx = context(p, DataflowOptions::default());
        let mut env = Environment::new(&ctx);
        let lx = env.get_or_create_storage_location(Entity::Decl(x), &Type::Int);
        let lpx = env.get_or_create_storage_location(Entity::Decl(px), &Type::pointer_to(Type::Int));
        env.set_value(lpx, Value::Pointer(PointsTo::to(lx)));

        let reachable = env.reachable_from(&[Value::Pointer(PointsTo::to(lpx))]);
        assert!(reachable.contains(&lpx));
        assert!(reachable.contains(&lx));
    }

    #[test]
    fn test_pop_frame_forgets_escaped_callee_locals() {
        let mut p = Program::new();
        let f = p.declare_function("f", vec![], Type::Void);
        let t = p.local("t", Type::Int);
        let ctx = context(p, DataflowOptions::with_inlining(1));
        let mut env = Environment::new(&ctx);

        env.push_frame(f, &[]).unwrap();
        let lt = env.get_or_create_storage_location(Entity::Decl(t), &Type::Int);
        env.mark_address_taken(lt);
        env.mark_escaped([lt]);
        env.pop_frame().unwrap();

        assert!(!env.is_live(lt));
        assert!(!env.is_address_taken(lt));
        assert!(!env.is_escaped(lt));
        assert!(env.exposed_locations().is_empty());
    }

    #[test]
    fn test_frames_bounded_and_restored() {
        let mut p = Program::new();
        let n = p.param("n", Type::Int);
        let f = p.declare_function("f", vec![n], Type::Int);
        let x = p.local("x", Type::Int);
        let ctx = context(p, DataflowOptions::with_inlining(1));
        let mut env = Environment::new(&ctx);
        let lx = env.get_or_create_storage_location(Entity::Decl(x), &Type::Int);
        env.set_value(lx, ints(&[1]));

        env.push_frame(f, &[ints(&[9])]).unwrap();
        assert_eq!(env.depth(), 1);
        assert_eq!(env.current_callee(), Some(f));
        // nothing returned yet
        assert_eq!(env.return_value(), Value::Bottom);
        assert_eq!(env.storage_location(Entity::Decl(x)), None);
        assert_eq!(env.decl_value(n), ints(&[9]));
        assert!(matches!(
            env.push_frame(f, &[]),
            Err(FrameError::RecursionLimitExceeded { limit: 1, .. })
        ));

        let ret = env.return_location(&Type::Int);
        env.set_value(ret, ints(&[3]));
        assert_eq!(env.return_value(), ints(&[3]));
        assert_eq!(env.pop_frame().unwrap(), ints(&[3]));
        assert_eq!(env.depth(), 0);
        assert_eq!(env.current_callee(), None);
        assert_eq!(env.decl_value(x), ints(&[1]));
        assert!(matches!(env.pop_frame(), Err(FrameError::EmptyCallStack)));
    }

    #[test]
    fn test_widen_uses_previous() {
        use crate::domains::interval::{Bound, Interval, Intervals};

        let mut p = Program::new();
        let i = p.local("i", Type::Int);
        let ctx = DataflowContext::new(Arc::new(p), Intervals::default(), DataflowOptions::default());
        let mut prev = Environment::new(&ctx);
        let li = prev.get_or_create_storage_location(Entity::Decl(i), &Type::Int);
        prev.set_value(li, Value::scalar(Interval::range(0, 1)));
        let mut next = prev.fork();
        next.set_value(li, Value::scalar(Interval::range(0, 2)));

        let widened = next.widen(&prev);
        let Value::Scalar(interval) = widened.value(li) else {
            panic!("expected an interval");
        };
        assert_eq!(interval.high, Bound::PosInf);
    }
}
