//! Integration tests for whole-function dataflow analysis
//!
//! Tests the full pipeline from a statement tree through CFG construction,
//! the fixpoint solver and the transfer function.
//!
//! Test Strategy:
//! - Merging of branch-assigned values at join points
//! - Short-circuit operators reading operand environments from other blocks
//! - Opaque calls invalidating only what a callee could reach, globals
//!   and what they point to included
//! - Loop termination through widening
//! - Depth-bounded inlining and its fallback
//! - Composability of element-by-element transfer

use std::sync::Arc;

use flowsense_core::ast::{BinaryOp, Type};
use flowsense_core::domains::flat::{Constant, ConstantPropagation};
use flowsense_core::domains::interval::{Bound, Intervals};
use flowsense_core::domains::value_set::{PossibleValues, ValueSet};
use flowsense_core::domains::Const;
use flowsense_core::{
    transfer, DataflowAnalysis, DataflowContext, DataflowOptions, EmptyStmtEnvMap, Entity, Environment,
    FixpointSolver, Program, Value,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn constant(n: i64) -> Value<Constant> {
    Value::scalar(Constant::Value(Const::Int(n)))
}

fn bools(values: &[bool]) -> Value<ValueSet> {
    Value::scalar(ValueSet::of(values.iter().map(|b| Const::Bool(*b))))
}

/// `x = 1; if (c) x = 2; else x = 3;` merges to "2 or 3"
#[test]
fn test_branch_values_join_at_merge() {
    init_tracing();
    let mut p = Program::new();
    let c = p.param("c", Type::Bool);
    let x = p.local("x", Type::Int);
    let one = p.int(1);
    let decl = p.declare(x, Some(one));
    let cond = p.var(c);
    let x_then = p.var(x);
    let two = p.int(2);
    let set_two = p.assign(x_then, two);
    let x_else = p.var(x);
    let three = p.int(3);
    let set_three = p.assign(x_else, three);
    let branch = p.if_stmt(cond, vec![set_two], vec![set_three]);
    let xr = p.var(x);
    let ret = p.return_stmt(Some(xr));
    let f = p.define_function("f", vec![c], Type::Int, vec![decl, branch, ret]);

    let analysis = DataflowAnalysis::new(Arc::new(p), f, PossibleValues, DataflowOptions::default()).unwrap();
    let result = analysis.run().unwrap();
    assert!(result.converged);

    let expected = Value::scalar(ValueSet::of([Const::Int(2), Const::Int(3)]));
    assert_eq!(result.exit_value(x), expected);
    // the value is readable at the returned expression too
    let after_read = result.environment_after(xr).unwrap();
    assert_eq!(after_read.expr_value(xr), expected);
    // each branch still sees its own assignment
    let after_two = result.environment_after(set_two).unwrap();
    assert_eq!(after_two.decl_value(x), Value::scalar(ValueSet::single(Const::Int(2))));
}

/// With a flat lattice the merge of two constants is unknown
#[test]
fn test_branch_values_collapse_in_flat_lattice() {
    let mut p = Program::new();
    let c = p.param("c", Type::Bool);
    let x = p.local("x", Type::Int);
    let decl = p.declare(x, None);
    let cond = p.var(c);
    let x_then = p.var(x);
    let two = p.int(2);
    let set_two = p.assign(x_then, two);
    let x_else = p.var(x);
    let three = p.int(3);
    let set_three = p.assign(x_else, three);
    let branch = p.if_stmt(cond, vec![set_two], vec![set_three]);
    let f = p.define_function("f", vec![c], Type::Void, vec![decl, branch]);

    let analysis = DataflowAnalysis::new(Arc::new(p), f, ConstantPropagation, DataflowOptions::default()).unwrap();
    let result = analysis.run().unwrap();
    assert_eq!(result.exit_value(x), Value::Top);
}

/// `b = a && (c = true)` keeps the right operand's side effect only on the
/// path that evaluated it
#[test]
fn test_logical_and_uses_right_operand_environment() {
    init_tracing();
    let mut p = Program::new();
    let a = p.param("a", Type::Bool);
    let b = p.local("b", Type::Bool);
    let c = p.local("c", Type::Bool);
    let f_lit = p.bool_lit(false);
    let decl_c = p.declare(c, Some(f_lit));
    let ar = p.var(a);
    let cr = p.var(c);
    let t_lit = p.bool_lit(true);
    let set_c = p.assign(cr, t_lit);
    let and = p.and(ar, set_c);
    let decl_b = p.declare(b, Some(and));
    let f = p.define_function("f", vec![a], Type::Void, vec![decl_c, decl_b]);

    let analysis = DataflowAnalysis::new(Arc::new(p), f, PossibleValues, DataflowOptions::default()).unwrap();
    let result = analysis.run().unwrap();

    // true when `c = true` ran, false along the short circuit
    assert_eq!(result.exit_value(b), bools(&[false, true]));
    assert_eq!(result.exit_value(c), bools(&[false, true]));

    // inside the right operand's block `a` is known to be true
    let rhs_env = result.environment_after(set_c).unwrap();
    assert_eq!(rhs_env.decl_value(a), bools(&[true]));
}

/// With `a` known false the right operand is never evaluated
#[test]
fn test_logical_and_short_circuits_on_false() {
    let mut p = Program::new();
    let a = p.local("a", Type::Bool);
    let b = p.local("b", Type::Bool);
    let c = p.local("c", Type::Bool);
    let f_a = p.bool_lit(false);
    let decl_a = p.declare(a, Some(f_a));
    let f_c = p.bool_lit(false);
    let decl_c = p.declare(c, Some(f_c));
    let ar = p.var(a);
    let cr = p.var(c);
    let t_lit = p.bool_lit(true);
    let set_c = p.assign(cr, t_lit);
    let and = p.and(ar, set_c);
    let decl_b = p.declare(b, Some(and));
    let f = p.define_function("f", vec![], Type::Void, vec![decl_a, decl_c, decl_b]);

    let analysis = DataflowAnalysis::new(Arc::new(p), f, PossibleValues, DataflowOptions::default()).unwrap();
    let result = analysis.run().unwrap();

    assert_eq!(result.exit_value(b), bools(&[false]));
    assert_eq!(result.exit_value(c), bools(&[false]));
    assert!(result.environment_after(set_c).is_none());
}

/// `a || c` short-circuits on true
#[test]
fn test_logical_or_value() {
    let mut p = Program::new();
    let a = p.param("a", Type::Bool);
    let b = p.local("b", Type::Bool);
    let c = p.local("c", Type::Bool);
    let f_c = p.bool_lit(false);
    let decl_c = p.declare(c, Some(f_c));
    let ar = p.var(a);
    let cr = p.var(c);
    let or = p.or(ar, cr);
    let decl_b = p.declare(b, Some(or));
    let f = p.define_function("f", vec![a], Type::Void, vec![decl_c, decl_b]);

    let analysis = DataflowAnalysis::new(Arc::new(p), f, PossibleValues, DataflowOptions::default()).unwrap();
    let result = analysis.run().unwrap();
    // true from the short circuit, c's false otherwise
    assert_eq!(result.exit_value(b), bools(&[false, true]));
}

/// `r = c ? 1 : 2` joins both arms
#[test]
fn test_conditional_expression_joins_arms() {
    let mut p = Program::new();
    let c = p.param("c", Type::Bool);
    let r = p.local("r", Type::Int);
    let cond = p.var(c);
    let one = p.int(1);
    let two = p.int(2);
    let select = p.conditional(cond, one, two);
    let decl = p.declare(r, Some(select));
    let f = p.define_function("f", vec![c], Type::Void, vec![decl]);

    let analysis = DataflowAnalysis::new(Arc::new(p), f, PossibleValues, DataflowOptions::default()).unwrap();
    let result = analysis.run().unwrap();
    assert_eq!(
        result.exit_value(r),
        Value::scalar(ValueSet::of([Const::Int(1), Const::Int(2)]))
    );
}

/// Passing `&x` to an opaque callee loses `x` but keeps `y`; later opaque
/// calls keep clobbering the escaped `x`
#[test]
fn test_opaque_call_invalidates_reachable_only() {
    let mut p = Program::new();
    let ptr = p.param("ptr", Type::pointer_to(Type::Int));
    let ext = p.declare_function("ext", vec![ptr], Type::Void);
    let other = p.declare_function("other", vec![], Type::Void);

    let x = p.local("x", Type::Int);
    let y = p.local("y", Type::Int);
    let one = p.int(1);
    let decl_x = p.declare(x, Some(one));
    let two = p.int(2);
    let decl_y = p.declare(y, Some(two));
    let xr = p.var(x);
    let addr = p.addr_of(xr);
    let call_ext = p.call(ext, vec![addr]);
    let xr2 = p.var(x);
    let five = p.int(5);
    let set_x = p.assign(xr2, five);
    let call_other = p.call(other, vec![]);
    let f = p.define_function("f", vec![], Type::Void, vec![decl_x, decl_y, call_ext, set_x, call_other]);

    let analysis = DataflowAnalysis::new(Arc::new(p), f, ConstantPropagation, DataflowOptions::default()).unwrap();
    let result = analysis.run().unwrap();

    let after_ext = result.environment_after(call_ext).unwrap();
    assert_eq!(after_ext.decl_value(x), Value::Top);
    assert_eq!(after_ext.decl_value(y), constant(2));
    let lx = after_ext.storage_location(Entity::Decl(x)).unwrap();
    assert!(after_ext.is_escaped(lx));

    let after_set = result.environment_after(set_x).unwrap();
    assert_eq!(after_set.decl_value(x), constant(5));

    assert_eq!(result.exit_value(x), Value::Top);
    assert_eq!(result.exit_value(y), constant(2));
}

/// Opaque calls also clobber globals
#[test]
fn test_opaque_call_invalidates_globals() {
    let mut p = Program::new();
    let g = p.global("g", Type::Int);
    let ext = p.declare_function("ext", vec![], Type::Void);
    let gr = p.var(g);
    let seven = p.int(7);
    let set_g = p.assign(gr, seven);
    let call = p.call(ext, vec![]);
    let f = p.define_function("f", vec![], Type::Void, vec![set_g, call]);

    let analysis = DataflowAnalysis::new(Arc::new(p), f, ConstantPropagation, DataflowOptions::default()).unwrap();
    let result = analysis.run().unwrap();
    let after_set = result.environment_after(set_g).unwrap();
    assert_eq!(after_set.decl_value(g), constant(7));
    assert_eq!(result.exit_value(g), Value::Top);
}

/// `int x = 1; g = &x; ext();` loses `x`: the callee can write through `g`
#[test]
fn test_opaque_call_invalidates_locals_reachable_from_globals() {
    let mut p = Program::new();
    let g = p.global("g", Type::pointer_to(Type::Int));
    let ext = p.declare_function("ext", vec![], Type::Void);
    let other = p.declare_function("other", vec![], Type::Void);
    let x = p.local("x", Type::Int);
    let one = p.int(1);
    let decl_x = p.declare(x, Some(one));
    let gr = p.var(g);
    let xr = p.var(x);
    let addr = p.addr_of(xr);
    let publish = p.assign(gr, addr);
    let call_ext = p.call(ext, vec![]);
    let xr2 = p.var(x);
    let three = p.int(3);
    let set_x = p.assign(xr2, three);
    let call_other = p.call(other, vec![]);
    let f = p.define_function("f", vec![], Type::Void, vec![decl_x, publish, call_ext, set_x, call_other]);

    let analysis = DataflowAnalysis::new(Arc::new(p), f, ConstantPropagation, DataflowOptions::default()).unwrap();
    let result = analysis.run().unwrap();

    let after_ext = result.environment_after(call_ext).unwrap();
    assert_eq!(after_ext.decl_value(x), Value::Top);
    let lx = after_ext.storage_location(Entity::Decl(x)).unwrap();
    assert!(after_ext.is_escaped(lx));
    assert_eq!(result.environment_after(set_x).unwrap().decl_value(x), constant(3));
    // escaped for good, even though g itself is now unknown
    assert_eq!(result.exit_value(x), Value::Top);
}

/// `int *q = get(); g = 1; *q = 5;` may have written `g`
#[test]
fn test_store_through_unknown_pointer_degrades_globals() {
    let mut p = Program::new();
    let g = p.global("g", Type::Int);
    let get = p.declare_function("get", vec![], Type::pointer_to(Type::Int));
    let q = p.local("q", Type::pointer_to(Type::Int));
    let y = p.local("y", Type::Int);
    let call = p.call(get, vec![]);
    let decl_q = p.declare(q, Some(call));
    let gr = p.var(g);
    let one = p.int(1);
    let set_g = p.assign(gr, one);
    let two = p.int(2);
    let decl_y = p.declare(y, Some(two));
    let qr = p.var(q);
    let deref = p.deref(qr);
    let five = p.int(5);
    let store = p.assign(deref, five);
    let f = p.define_function("f", vec![], Type::Void, vec![decl_q, set_g, decl_y, store]);

    let analysis = DataflowAnalysis::new(Arc::new(p), f, ConstantPropagation, DataflowOptions::default()).unwrap();
    let result = analysis.run().unwrap();

    assert_eq!(result.environment_after(set_g).unwrap().decl_value(g), constant(1));
    assert_eq!(result.exit_value(g), Value::Top);
    assert_eq!(result.exit_value(y), constant(2));
}

/// `i = 0; while (i < n) i += 1;` terminates with `i` in [0, +inf)
#[test]
fn test_interval_loop_widens_and_terminates() {
    init_tracing();
    let mut p = Program::new();
    let n = p.param("n", Type::Int);
    let i = p.local("i", Type::Int);
    let zero = p.int(0);
    let decl = p.declare(i, Some(zero));
    let ir = p.var(i);
    let nr = p.var(n);
    let cond = p.binary(BinaryOp::Lt, ir, nr);
    let ir2 = p.var(i);
    let one = p.int(1);
    let inc = p.compound_assign(BinaryOp::Add, ir2, one);
    let body = p.while_stmt(cond, vec![inc]);
    let f = p.define_function("f", vec![n], Type::Void, vec![decl, body]);

    let analysis = DataflowAnalysis::new(Arc::new(p), f, Intervals::default(), DataflowOptions::default()).unwrap();
    let result = analysis.run().unwrap();
    assert!(result.converged);
    assert!(result.iterations < 50);

    let Value::Scalar(interval) = result.exit_value(i) else {
        panic!("expected an interval for i");
    };
    assert_eq!(interval.low, Bound::Finite(0));
    assert_eq!(interval.high, Bound::PosInf);
}

/// A constant loop bound narrows the exit edge
#[test]
fn test_interval_loop_exit_is_narrowed() {
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

    let analysis = DataflowAnalysis::new(Arc::new(p), f, Intervals::default(), DataflowOptions::default()).unwrap();
    let result = analysis.run().unwrap();
    assert!(result.converged);

    let Value::Scalar(interval) = result.exit_value(i) else {
        panic!("expected an interval for i");
    };
    assert_eq!(interval.low, Bound::Finite(10));

    // inside the body the loop condition holds
    let Value::Scalar(in_body) = result.environment_after(inc).unwrap().decl_value(i) else {
        panic!("expected an interval inside the loop");
    };
    assert_eq!(in_body.high, Bound::Finite(10));
}

/// A finite-height lattice needs no widening to terminate
#[test]
fn test_constant_loop_terminates() {
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

    let analysis = DataflowAnalysis::new(Arc::new(p), f, ConstantPropagation, DataflowOptions::default()).unwrap();
    let result = analysis.run().unwrap();
    assert!(result.converged);
    assert_eq!(result.exit_value(i), Value::Top);
}

fn program_with_inc() -> (Program, flowsense_core::FunctionId, flowsense_core::DeclId) {
    let mut p = Program::new();
    let n = p.param("n", Type::Int);
    let nr = p.var(n);
    let one = p.int(1);
    let sum = p.binary(BinaryOp::Add, nr, one);
    let ret = p.return_stmt(Some(sum));
    let inc = p.define_function("inc", vec![n], Type::Int, vec![ret]);

    let r = p.local("r", Type::Int);
    let arg = p.int(41);
    let call = p.call(inc, vec![arg]);
    let decl = p.declare(r, Some(call));
    let rr = p.var(r);
    let ret_main = p.return_stmt(Some(rr));
    let main = p.define_function("main", vec![], Type::Int, vec![decl, ret_main]);
    (p, main, r)
}

/// Inlining propagates the callee's return value
#[test]
fn test_inlined_call_returns_value() {
    init_tracing();
    let (p, main, r) = program_with_inc();
    let analysis = DataflowAnalysis::new(Arc::new(p), main, ConstantPropagation, DataflowOptions::with_inlining(2)).unwrap();
    let result = analysis.run().unwrap();
    assert_eq!(result.exit_value(r), constant(42));
    // back in the caller's frame afterwards
    assert_eq!(result.exit_environment().unwrap().depth(), 0);
}

/// Without inlining the same call is opaque
#[test]
fn test_call_opaque_without_inlining() {
    let (p, main, r) = program_with_inc();
    let analysis = DataflowAnalysis::new(Arc::new(p), main, ConstantPropagation, DataflowOptions::default()).unwrap();
    let result = analysis.run().unwrap();
    assert_eq!(result.exit_value(r), Value::Top);
}

/// `fact(n) { if (n <= 1) return 1; return n * fact(n - 1); }`
fn program_with_fact(arg: i64) -> (Program, flowsense_core::FunctionId, flowsense_core::DeclId) {
    let mut p = Program::new();
    let n = p.param("n", Type::Int);
    let fact = p.declare_function("fact", vec![n], Type::Int);
    let nr = p.var(n);
    let one = p.int(1);
    let cond = p.binary(BinaryOp::Le, nr, one);
    let one_ret = p.int(1);
    let base = p.return_stmt(Some(one_ret));
    let base_case = p.if_stmt(cond, vec![base], vec![]);
    let nr2 = p.var(n);
    let nr3 = p.var(n);
    let one_sub = p.int(1);
    let pred = p.binary(BinaryOp::Sub, nr3, one_sub);
    let rec = p.call(fact, vec![pred]);
    let product = p.binary(BinaryOp::Mul, nr2, rec);
    let ret = p.return_stmt(Some(product));
    p.set_body(fact, vec![base_case, ret]);

    let r = p.local("r", Type::Int);
    let arg = p.int(arg);
    let call = p.call(fact, vec![arg]);
    let decl = p.declare(r, Some(call));
    let main = p.define_function("main", vec![], Type::Void, vec![decl]);
    (p, main, r)
}

/// The base case resolves without ever reaching the recursive call
#[test]
fn test_recursive_inlining_base_case() {
    let (p, main, r) = program_with_fact(1);
    let analysis = DataflowAnalysis::new(Arc::new(p), main, ConstantPropagation, DataflowOptions::with_inlining(1)).unwrap();
    let result = analysis.run().unwrap();
    assert_eq!(result.exit_value(r), constant(1));
}

/// Recursion past the depth budget falls back to an opaque call
#[test]
fn test_recursion_limit_falls_back_to_opaque() {
    let (p, main, r) = program_with_fact(3);
    let analysis = DataflowAnalysis::new(Arc::new(p), main, ConstantPropagation, DataflowOptions::with_inlining(1)).unwrap();
    let result = analysis.run().unwrap();
    assert!(result.converged);
    assert_eq!(result.exit_value(r), Value::Top);
}

/// `helper() { int t = 0; sink(&t); }` inlined, then `other()`: the
/// helper's escaped local stays dead in the caller
#[test]
fn test_inlined_frame_locals_do_not_outlive_the_call() {
    let mut p = Program::new();
    let ptr = p.param("ptr", Type::pointer_to(Type::Int));
    let sink = p.declare_function("sink", vec![ptr], Type::Void);
    let other = p.declare_function("other", vec![], Type::Void);
    let t = p.local("t", Type::Int);
    let zero = p.int(0);
    let decl_t = p.declare(t, Some(zero));
    let tr = p.var(t);
    let addr = p.addr_of(tr);
    let call_sink = p.call(sink, vec![addr]);
    let helper = p.define_function("helper", vec![], Type::Void, vec![decl_t, call_sink]);
    let call_helper = p.call(helper, vec![]);
    let call_other = p.call(other, vec![]);
    let main = p.define_function("main", vec![], Type::Void, vec![call_helper, call_other]);

    let analysis = DataflowAnalysis::new(Arc::new(p), main, ConstantPropagation, DataflowOptions::with_inlining(1)).unwrap();
    let result = analysis.run().unwrap();
    let exit = result.exit_environment().unwrap();
    let ctx = exit.context();

    assert_eq!(exit.depth(), 0);
    assert!(exit.escaped().all(|loc| ctx.location_depth(loc) == Some(0)));
    assert!(exit.address_taken().all(|loc| ctx.location_depth(loc) == Some(0)));
    // only the helper's return slot survives the frame
    assert!(exit
        .live_locations()
        .filter(|loc| ctx.location_depth(*loc) == Some(1))
        .all(|loc| ctx.location_type(loc) == Type::Void));
    let after_other = result.environment_after(call_other).unwrap();
    assert!(after_other.exposed_locations().is_empty());
}

/// Transferring the entry block's elements by hand reproduces the solver's
/// exit environment for straight-line code
#[test]
fn test_straight_line_composability() {
    let mut p = Program::new();
    let x = p.local("x", Type::Int);
    let y = p.local("y", Type::Int);
    let one = p.int(1);
    let decl_x = p.declare(x, Some(one));
    let xr = p.var(x);
    let two = p.int(2);
    let sum = p.binary(BinaryOp::Add, xr, two);
    let decl_y = p.declare(y, Some(sum));
    let xr2 = p.var(x);
    let yr = p.var(y);
    let three = p.int(3);
    let product = p.binary(BinaryOp::Mul, yr, three);
    let set_x = p.assign(xr2, product);
    let f = p.define_function("f", vec![], Type::Void, vec![decl_x, decl_y, set_x]);

    let ctx = DataflowContext::new(Arc::new(p), ConstantPropagation, DataflowOptions::default());
    let cfg = ctx.cfg_for(f).unwrap();
    let result = FixpointSolver::new(&ctx)
        .solve(&cfg, Environment::for_function(&ctx, f))
        .unwrap();

    let mut manual = Environment::for_function(&ctx, f);
    for &stmt in &cfg.block(cfg.entry).elements {
        transfer(&EmptyStmtEnvMap, stmt, &mut manual).unwrap();
    }
    assert_eq!(Some(&manual), result.block_exits.get(&cfg.entry));

    // A manual walk over top-level statements only agrees on variable values
    let mut top_level = Environment::for_function(&ctx, f);
    for stmt in [decl_x, decl_y, set_x] {
        transfer(&EmptyStmtEnvMap, stmt, &mut top_level).unwrap();
    }
    assert_eq!(top_level.decl_value(x), constant(9));
    assert_eq!(top_level.decl_value(y), constant(3));
    assert_eq!(result.exit_value(x), constant(9));
}

/// Transfer is deterministic for equal inputs
#[test]
fn test_transfer_is_deterministic() {
    let mut p = Program::new();
    let x = p.local("x", Type::Int);
    let four = p.int(4);
    let decl = p.declare(x, Some(four));
    let ctx = DataflowContext::new(Arc::new(p), ConstantPropagation, DataflowOptions::default());

    let start = Environment::new(&ctx);
    let mut first = start.fork();
    let mut second = start.fork();
    transfer(&EmptyStmtEnvMap, four, &mut first).unwrap();
    transfer(&EmptyStmtEnvMap, decl, &mut first).unwrap();
    transfer(&EmptyStmtEnvMap, four, &mut second).unwrap();
    transfer(&EmptyStmtEnvMap, decl, &mut second).unwrap();
    assert_eq!(first, second);
    // the starting snapshot is untouched
    assert_eq!(start, Environment::new(&ctx));
}

/// Unreachable code after a return never gets an environment
#[test]
fn test_code_after_return_unreachable() {
    let mut p = Program::new();
    let x = p.local("x", Type::Int);
    let ret = p.return_stmt(None);
    let one = p.int(1);
    let dead = p.declare(x, Some(one));
    let f = p.define_function("f", vec![], Type::Void, vec![ret, dead]);

    let analysis = DataflowAnalysis::new(Arc::new(p), f, ConstantPropagation, DataflowOptions::default()).unwrap();
    let result = analysis.run().unwrap();
    assert!(result.environment_after(ret).is_some());
    assert!(result.environment_after(dead).is_none());
    assert!(result.exit_environment().is_some());
}
