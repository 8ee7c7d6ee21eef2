//! Per-statement transfer function
//!
//! [`transfer`] applies the effect of one CFG element to the environment
//! valid just before it. Sub-expressions that are elements of their own
//! have already been transferred, so their values are read back from the
//! environment instead of being recomputed; anything not yet recorded (a
//! caller walking the tree by hand) is evaluated on the spot.
//!
//! Operands of `&&`, `||` and `?:` live in other blocks and are read through
//! the [`StmtToEnvMap`]. [`assume`] is the narrowing hook the solver runs on
//! each outgoing edge of a conditional branch.

use std::collections::BTreeSet;
use tracing::{debug, trace, warn};

use crate::ast::{BinaryOp, Callee, DeclId, FunctionId, Literal, LogicalOp, Program, StmtId, StmtKind, Type, UnaryOp};
use crate::elide::{is_elided_kind, skip_elided};
use crate::environment::Environment;
use crate::error::TransferError;
use crate::lattice::{AbstractValue, AliasModel, CallEffect, Lattice, PointsTo, Truth, Value};
use crate::solver::FixpointSolver;
use crate::stmt_env::StmtToEnvMap;
use crate::storage::{Entity, StorageLocation};

/// Apply the effect of `stmt` to `env`.
///
/// `stmt` must be an element the CFG can hold: passing a parenthesized
/// expression or a cleanup wrapper is a caller bug and fails with
/// [`TransferError::ElidedNode`]. Unwrap those with
/// [`skip_cleanup_wrapper`](crate::elide::skip_cleanup_wrapper) first.
/// No other condition is an error; constructs without a model leave the
/// environment untouched.
pub fn transfer<'c, L: Lattice>(
    stmt_to_env: &dyn StmtToEnvMap<'c, L>,
    stmt: StmtId,
    env: &mut Environment<'c, L>,
) -> Result<(), TransferError> {
    let program = env.program();
    let kind = program.kind(stmt);
    if is_elided_kind(kind) {
        return Err(TransferError::ElidedNode {
            stmt,
            kind: kind.name(),
        });
    }
    trace!(%stmt, kind = kind.name(), depth = env.depth(), "transfer");

    let mut eval = Evaluator {
        stmt_to_env,
        env,
        program,
    };
    eval.statement(stmt);
    Ok(())
}

/// Where an lvalue expression stores its value
#[derive(Debug, Clone, PartialEq)]
enum Place {
    /// A variable, or a field of one, reached without a dereference
    Local(StorageLocation),
    /// Every location a dereferenced pointer may target
    Pointee(Vec<StorageLocation>),
    Unknown,
}

impl Place {
    fn exact(&self) -> Option<StorageLocation> {
        match self {
            Place::Local(loc) => Some(*loc),
            Place::Pointee(locs) if locs.len() == 1 => Some(locs[0]),
            _ => None,
        }
    }
}

struct Evaluator<'e, 'c, L: Lattice> {
    stmt_to_env: &'e dyn StmtToEnvMap<'c, L>,
    env: &'e mut Environment<'c, L>,
    program: &'c Program,
}

impl<'c, L: Lattice> Evaluator<'_, 'c, L> {
    fn lattice(&self) -> &'c L {
        self.env.lattice()
    }

    fn statement(&mut self, stmt: StmtId) {
        let program = self.program;
        match program.kind(stmt) {
            StmtKind::Decl { decl, init } => {
                let loc = self
                    .env
                    .get_or_create_storage_location(Entity::Decl(*decl), &program.decl(*decl).ty);
                match init {
                    Some(init) => {
                        let value = self.operand(*init);
                        self.env.store(loc, value);
                    }
                    None => self.env.clear_value(loc),
                }
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    let result = self.operand(*value);
                    let loc = self.env.return_location(program.ty(*value));
                    self.env.store(loc, result);
                }
            }
            // Control structure is the CFG's business
            StmtKind::If { .. }
            | StmtKind::While { .. }
            | StmtKind::Block(_)
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Opaque(_) => {}
            _ => {
                self.rvalue(stmt);
            }
        }
    }

    /// Value of a child expression: the recorded one if its element already
    /// ran, otherwise evaluated now
    fn operand(&mut self, expr: StmtId) -> Value<L::Value> {
        let expr = skip_elided(self.program, expr);
        if self.env.has_expr(expr) {
            return self.env.expr_value(expr);
        }
        self.rvalue(expr)
    }

    /// Evaluate `expr` itself and record the result against it
    fn rvalue(&mut self, expr: StmtId) -> Value<L::Value> {
        let program = self.program;
        let value = match program.kind(expr) {
            StmtKind::Paren(inner) | StmtKind::ExprWithCleanups(inner) => return self.operand(*inner),
            StmtKind::Literal(Literal::Null) => Value::Pointer(PointsTo::null()),
            StmtKind::Literal(literal) => Value::scalar(self.lattice().literal(literal)),
            StmtKind::DeclRef(_) | StmtKind::Deref(_) | StmtKind::Member { .. } => {
                let place = self.place(expr);
                if let Some(loc) = place.exact() {
                    // place() bound the expression to its location
                    return self.env.load(loc);
                }
                self.read(&place)
            }
            StmtKind::Unary { op, operand } => {
                let v = self.operand(*operand);
                self.unary(*op, &v)
            }
            StmtKind::Binary { op, lhs, rhs } => {
                let l = self.operand(*lhs);
                let r = self.operand(*rhs);
                self.binary(*op, &l, &r)
            }
            StmtKind::Logical { op, lhs, rhs } => self.logical(*op, *lhs, *rhs),
            StmtKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => self.conditional(*cond, *then_expr, *else_expr),
            StmtKind::AddrOf(inner) => self.address_of(*inner),
            StmtKind::Assign { target, value } => {
                let v = self.operand(*value);
                let place = self.place(*target);
                self.write(&place, v.clone());
                v
            }
            StmtKind::CompoundAssign { op, target, value } => {
                let rhs = self.operand(*value);
                let place = self.place(*target);
                let old = self.read(&place);
                let new = self.binary(*op, &old, &rhs);
                self.write(&place, new.clone());
                new
            }
            StmtKind::Call { callee, args } => self.call(callee, args),
            StmtKind::InitList(fields) => {
                let loc = self.env.expr_storage_location(expr, program.ty(expr));
                for (name, init) in fields {
                    let v = self.operand(*init);
                    if let Some(field) = self.env.child(loc, name) {
                        self.env.store(field, v);
                    }
                }
                return self.env.load(loc);
            }
            StmtKind::Opaque(_)
            | StmtKind::Decl { .. }
            | StmtKind::Return(_)
            | StmtKind::If { .. }
            | StmtKind::While { .. }
            | StmtKind::Block(_)
            | StmtKind::Break
            | StmtKind::Continue => return Value::Top,
        };

        let loc = self.env.expr_storage_location(expr, program.ty(expr));
        self.env.store(loc, value.clone());
        value
    }

    fn bool_value(&self, truth: Truth) -> Value<L::Value> {
        let lattice = self.lattice();
        match truth {
            Truth::True => Value::scalar(lattice.from_bool(true)),
            Truth::False => Value::scalar(lattice.from_bool(false)),
            Truth::Unknown => Value::scalar(lattice.from_bool(true).join(&lattice.from_bool(false))),
        }
    }

    fn unary(&self, op: UnaryOp, operand: &Value<L::Value>) -> Value<L::Value> {
        match (op, operand) {
            (_, Value::Bottom) => Value::Bottom,
            (_, Value::Scalar(v)) => Value::scalar(self.lattice().unary(op, v)),
            (UnaryOp::Not, v) => self.bool_value(self.env.truth(v).negate()),
            _ => Value::Top,
        }
    }

    fn binary(&self, op: BinaryOp, lhs: &Value<L::Value>, rhs: &Value<L::Value>) -> Value<L::Value> {
        match (lhs, rhs) {
            (Value::Bottom, _) | (_, Value::Bottom) => Value::Bottom,
            (Value::Pointer(a), Value::Pointer(b)) if matches!(op, BinaryOp::Eq | BinaryOp::Ne) => {
                let equal = pointer_equality(a, b);
                self.bool_value(if op == BinaryOp::Eq { equal } else { equal.negate() })
            }
            (Value::Scalar(_) | Value::Top, Value::Scalar(_) | Value::Top) => {
                Value::scalar(self.lattice().binary(op, &lhs.as_scalar(), &rhs.as_scalar()))
            }
            // Pointer arithmetic and aggregate operands
            _ => Value::Top,
        }
    }

    /// Value of the operand's own element in the environment right after it,
    /// falling back to what the running environment recorded, then to ⊤
    fn value_after(&self, expr: StmtId) -> Value<L::Value> {
        match self.stmt_to_env.environment(expr) {
            Some(env) => env.expr_value(expr),
            None => self.env.expr_value(expr),
        }
    }

    fn logical(&mut self, op: LogicalOp, lhs: StmtId, rhs: StmtId) -> Value<L::Value> {
        let lhs = skip_elided(self.program, lhs);
        let rhs = skip_elided(self.program, rhs);

        let lhs_value = self.value_after(lhs);
        let lhs_truth = self.env.truth(&lhs_value);
        // The right operand's result only exists in its own block
        let rhs_truth = match self.stmt_to_env.environment(rhs) {
            Some(env) => env.truth(&env.expr_value(rhs)),
            None => Truth::Unknown,
        };

        // `&&` short-circuits on false, `||` on true
        let short_circuit = op == LogicalOp::Or;
        let mut result = Value::Bottom;
        if lhs_truth.may_be(short_circuit) {
            result = result.join(&self.bool_value(Truth::from_bool(short_circuit)));
        }
        if lhs_truth.may_be(!short_circuit) {
            result = result.join(&self.bool_value(rhs_truth));
        }
        result
    }

    fn conditional(&mut self, cond: StmtId, then_expr: StmtId, else_expr: StmtId) -> Value<L::Value> {
        let cond = skip_elided(self.program, cond);
        let truth = self.env.truth(&self.value_after(cond));

        let mut result = None;
        for (branch, taken) in [(then_expr, true), (else_expr, false)] {
            if !truth.may_be(taken) {
                continue;
            }
            let branch = skip_elided(self.program, branch);
            if let Some(env) = self.stmt_to_env.environment(branch) {
                let value = env.expr_value(branch);
                result = Some(match result {
                    Some(acc) => value.join(&acc),
                    None => value,
                });
            }
        }
        result.unwrap_or(Value::Top)
    }

    fn address_of(&mut self, inner: StmtId) -> Value<L::Value> {
        match self.place(inner) {
            Place::Local(loc) => {
                self.env.mark_address_taken(loc);
                Value::Pointer(PointsTo::to(loc))
            }
            Place::Pointee(locs) => {
                for loc in &locs {
                    self.env.mark_address_taken(*loc);
                }
                Value::Pointer(PointsTo {
                    targets: locs.into_iter().collect(),
                    may_be_null: false,
                })
            }
            Place::Unknown => Value::Top,
        }
    }

    /// Resolve an lvalue expression, binding it to its location when exact
    fn place(&mut self, expr: StmtId) -> Place {
        let program = self.program;
        let expr = skip_elided(program, expr);
        let place = match program.kind(expr) {
            StmtKind::DeclRef(decl) => Place::Local(
                self.env
                    .get_or_create_storage_location(Entity::Decl(*decl), &program.decl(*decl).ty),
            ),
            StmtKind::Deref(pointer) => match self.operand(*pointer) {
                Value::Pointer(p) if !p.targets.is_empty() => Place::Pointee(p.targets.into_iter().collect()),
                _ => Place::Unknown,
            },
            StmtKind::Member { base, field } => match self.place(*base) {
                Place::Local(loc) => self.env.child(loc, field).map_or(Place::Unknown, Place::Local),
                Place::Pointee(locs) => locs
                    .iter()
                    .map(|loc| self.env.child(*loc, field))
                    .collect::<Option<Vec<_>>>()
                    .map_or(Place::Unknown, Place::Pointee),
                Place::Unknown => Place::Unknown,
            },
            // A temporary: call results and initializer lists live in the
            // expression's own location
            _ => {
                self.operand(expr);
                self.env
                    .storage_location(Entity::Expr(expr))
                    .map_or(Place::Unknown, Place::Local)
            }
        };
        if let Some(loc) = place.exact() {
            self.env.set_storage_location(expr, loc);
        }
        place
    }

    fn read(&self, place: &Place) -> Value<L::Value> {
        match place {
            Place::Local(loc) => self.env.load(*loc),
            Place::Pointee(locs) => locs
                .iter()
                .fold(Value::Bottom, |acc, loc| acc.join(&self.env.load(*loc))),
            Place::Unknown => Value::Top,
        }
    }

    fn write(&mut self, place: &Place, value: Value<L::Value>) {
        let conservative = self.lattice().alias_model() == AliasModel::Conservative;
        match place {
            Place::Local(loc) => self.env.store(*loc, value),
            Place::Pointee(_) if conservative => self.degrade_aliases(),
            Place::Pointee(locs) if locs.len() == 1 => self.env.store(locs[0], value),
            Place::Pointee(locs) => {
                for loc in locs {
                    self.env.store_weak(*loc, value.clone());
                }
            }
            Place::Unknown => self.degrade_aliases(),
        }
    }

    /// Store through an unknown pointer: anything that may be aliased is
    /// lost, which covers globals since an opaque callee can hand out `&g`
    fn degrade_aliases(&mut self) {
        let mut aliased = self.env.exposed_locations();
        aliased.extend(self.env.address_taken().chain(self.env.live_globals()));
        aliased.retain(|loc| self.env.is_live(*loc));
        debug!(count = aliased.len(), "store through imprecise pointer degrades aliased locations");
        for loc in aliased {
            self.env.havoc(loc);
        }
    }

    fn call(&mut self, callee: &Callee, args: &[StmtId]) -> Value<L::Value> {
        if let Callee::Indirect(target) = callee {
            self.operand(*target);
        }
        let arg_values: Vec<Value<L::Value>> = args.iter().map(|arg| self.operand(*arg)).collect();

        if let Callee::Direct(function) = callee {
            if self.env.context().options().context_sensitivity.enabled {
                if let Some(result) = self.inline(*function, &arg_values) {
                    return result;
                }
            }
        }
        self.opaque_call(&arg_values);
        Value::Top
    }

    /// Analyse the callee body in a new frame. `None` means the call has to
    /// be treated as opaque.
    fn inline(&mut self, function: FunctionId, args: &[Value<L::Value>]) -> Option<Value<L::Value>> {
        let ctx = self.env.context();
        let cfg = ctx.cfg_for(function)?;
        let name = &self.program.function(function).name;

        let mut callee_env = self.env.fork();
        if let Err(err) = callee_env.push_frame(function, args) {
            debug!(callee = %name, %err, "not inlining call");
            return None;
        }

        let result = match FixpointSolver::new(ctx).solve(&cfg, callee_env) {
            Ok(result) => result,
            Err(err) => {
                warn!(callee = %name, %err, "inlined callee could not be analysed");
                return None;
            }
        };
        if !result.converged {
            debug!(callee = %name, "inlined callee did not converge");
            return None;
        }
        let Some(exit) = result.exit_environment() else {
            debug!(callee = %name, "inlined callee never returns");
            return None;
        };

        let mut exit = exit.clone();
        let returned = match exit.pop_frame() {
            Ok(value) => value,
            Err(err) => {
                warn!(callee = %name, %err, "unbalanced frames after inlining");
                return None;
            }
        };
        *self.env = exit;
        // Functions without a return value
        Some(if returned.is_bottom() { Value::Top } else { returned })
    }

    /// Invalidate what an unknown callee could have touched
    fn opaque_call(&mut self, args: &[Value<L::Value>]) {
        let lattice = self.lattice();
        let exposed = self.env.exposed_locations();
        let reachable = self.env.reachable_from(args);
        let mut clobbered = BTreeSet::new();

        if lattice.call_invalidates(CallEffect::Globals) {
            clobbered.extend(self.env.live_globals());
        }
        if lattice.call_invalidates(CallEffect::Escaped) {
            clobbered.extend(exposed.iter().copied());
        }
        if lattice.call_invalidates(CallEffect::PointerArguments) {
            clobbered.extend(reachable.iter().copied());
        }
        self.env.mark_escaped(exposed.into_iter().chain(reachable));

        trace!(count = clobbered.len(), "opaque call invalidates locations");
        for loc in clobbered {
            self.env.set_value(loc, Value::Top);
        }
    }
}

fn pointer_equality(a: &PointsTo, b: &PointsTo) -> Truth {
    if a.is_null() && b.is_null() {
        return Truth::True;
    }
    let exact = |p: &PointsTo| p.targets.len() == 1 && !p.may_be_null;
    if exact(a) && a == b {
        return Truth::True;
    }
    if a.targets.is_disjoint(&b.targets) && !(a.may_be_null && b.may_be_null) {
        return Truth::False;
    }
    Truth::Unknown
}

/// Narrow `env` under the assumption that `cond` evaluates to `holds`.
///
/// Refines boolean, integer and pointer variables tested directly, through
/// `!`, through `&&`/`||` where the outcome pins both operands, and in
/// comparisons against a variable. Returns `false` when the assumption
/// contradicts what `env` already knows, i.e. the edge is infeasible.
pub fn assume<L: Lattice>(cond: StmtId, env: &mut Environment<'_, L>, holds: bool) -> bool {
    let program = env.program();
    let cond = skip_elided(program, cond);
    if env.has_expr(cond) {
        let truth = env.truth(&env.expr_value(cond));
        if !truth.may_be(holds) {
            return false;
        }
    }

    match program.kind(cond) {
        StmtKind::Unary {
            op: UnaryOp::Not,
            operand,
        } => assume(*operand, env, !holds),
        StmtKind::Logical {
            op: LogicalOp::And,
            lhs,
            rhs,
        } if holds => assume(*lhs, env, true) && assume(*rhs, env, true),
        StmtKind::Logical {
            op: LogicalOp::Or,
            lhs,
            rhs,
        } if !holds => assume(*lhs, env, false) && assume(*rhs, env, false),
        StmtKind::DeclRef(decl) => assume_decl(*decl, env, holds),
        StmtKind::Binary { op, lhs, rhs } if op.is_comparison() => assume_comparison(*op, *lhs, *rhs, env, holds),
        _ => true,
    }
}

/// A variable used directly as a condition
fn assume_decl<L: Lattice>(decl: DeclId, env: &mut Environment<'_, L>, holds: bool) -> bool {
    let Some(loc) = env.storage_location(Entity::Decl(decl)) else {
        return true;
    };
    let program = env.program();
    let lattice = env.lattice();
    let ty = &program.decl(decl).ty;

    match env.value(loc) {
        Value::Pointer(p) => {
            let narrowed = if holds {
                if p.targets.is_empty() {
                    return false;
                }
                PointsTo {
                    targets: p.targets,
                    may_be_null: false,
                }
            } else {
                if !p.may_be_null {
                    return false;
                }
                PointsTo::null()
            };
            env.set_value(loc, Value::Pointer(narrowed));
            true
        }
        Value::Top if ty.is_pointer() => {
            if !holds {
                env.set_value(loc, Value::Pointer(PointsTo::null()));
            }
            true
        }
        value @ (Value::Top | Value::Scalar(_)) => {
            let current = value.as_scalar();
            let refined = if *ty == Type::Bool {
                lattice.refine(BinaryOp::Eq, &current, &lattice.from_bool(holds))
            } else {
                let zero = lattice.literal(&Literal::Int(0));
                let op = if holds { BinaryOp::Ne } else { BinaryOp::Eq };
                lattice.refine(op, &current, &zero)
            };
            match refined {
                Some(v) => {
                    env.set_value(loc, Value::scalar(v));
                    true
                }
                None => false,
            }
        }
        Value::Bottom | Value::Aggregate(_) => true,
    }
}

fn assume_comparison<L: Lattice>(
    op: BinaryOp,
    lhs: StmtId,
    rhs: StmtId,
    env: &mut Environment<'_, L>,
    holds: bool,
) -> bool {
    let op = match (holds, op.negate()) {
        (true, _) => op,
        (false, Some(negated)) => negated,
        (false, None) => return true,
    };
    let program = env.program();
    let lhs = skip_elided(program, lhs);
    let rhs = skip_elided(program, rhs);

    // `p == NULL` / `p != NULL` is a test of the pointer itself
    for (var, other) in [(lhs, rhs), (rhs, lhs)] {
        if let (StmtKind::DeclRef(decl), StmtKind::Literal(Literal::Null)) = (program.kind(var), program.kind(other)) {
            return match op {
                BinaryOp::Eq => assume_decl(*decl, env, false),
                BinaryOp::Ne => assume_decl(*decl, env, true),
                _ => true,
            };
        }
    }

    let lhs_value = env.expr_value(lhs);
    let rhs_value = env.expr_value(rhs);
    if let StmtKind::DeclRef(decl) = program.kind(lhs) {
        if !refine_decl(*decl, op, &rhs_value, env) {
            return false;
        }
    }
    if let (StmtKind::DeclRef(decl), Some(swapped)) = (program.kind(rhs), op.swap()) {
        if !refine_decl(*decl, swapped, &lhs_value, env) {
            return false;
        }
    }
    true
}

/// Narrow a scalar variable under `decl op other`
fn refine_decl<L: Lattice>(decl: DeclId, op: BinaryOp, other: &Value<L::Value>, env: &mut Environment<'_, L>) -> bool {
    let Some(loc) = env.storage_location(Entity::Decl(decl)) else {
        return true;
    };
    let current = env.value(loc);
    if !matches!(current, Value::Top | Value::Scalar(_)) || !matches!(other, Value::Top | Value::Scalar(_)) {
        return true;
    }
    match env.lattice().refine(op, &current.as_scalar(), &other.as_scalar()) {
        Some(v) => {
            env.set_value(loc, Value::scalar(v));
            true
        }
        None => false,
    }
}
