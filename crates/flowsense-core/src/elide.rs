//! Node kinds the CFG never emits standalone
//!
//! Parenthesized expressions and cleanup wrappers only carry syntax or
//! temporary-destruction scaffolding; the temporaries' destruction shows up
//! as explicit elements elsewhere in the CFG, so skipping the wrapper loses
//! nothing the transfer function models.

use crate::ast::{Program, StmtId, StmtKind};

/// Whether `kind` is one of the wrappers the CFG omits
pub fn is_elided_kind(kind: &StmtKind) -> bool {
    matches!(kind, StmtKind::Paren(_) | StmtKind::ExprWithCleanups(_))
}

/// Unwraps one layer of cleanup scaffolding.
///
/// Returns `expr` unchanged unless it is an `ExprWithCleanups`, in which case
/// the wrapped sub-expression is returned. Absent in, absent out.
pub fn skip_cleanup_wrapper(program: &Program, expr: Option<StmtId>) -> Option<StmtId> {
    let expr = expr?;
    match program.kind(expr) {
        StmtKind::ExprWithCleanups(inner) => Some(*inner),
        _ => Some(expr),
    }
}

/// Strips any number of parenthesization layers
pub fn skip_parens(program: &Program, mut expr: StmtId) -> StmtId {
    while let StmtKind::Paren(inner) = program.kind(expr) {
        expr = *inner;
    }
    expr
}

/// Strips every stacked wrapper, parens and cleanups alike, down to the node
/// the CFG actually holds as an element
pub fn skip_elided(program: &Program, mut expr: StmtId) -> StmtId {
    while let StmtKind::Paren(inner) | StmtKind::ExprWithCleanups(inner) = program.kind(expr) {
        expr = *inner;
    }
    expr
}
