//! Flat constant lattice: ⊥ < every constant < ⊤

use super::{eval_binary, eval_unary, Const};
use crate::ast::{BinaryOp, Literal, UnaryOp};
use crate::lattice::{AbstractValue, Lattice, Truth};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constant {
    Bottom,
    Value(Const),
    Top,
}

impl AbstractValue for Constant {
    fn top() -> Self {
        Constant::Top
    }

    fn bottom() -> Self {
        Constant::Bottom
    }

    fn is_top(&self) -> bool {
        matches!(self, Constant::Top)
    }

    fn is_bottom(&self) -> bool {
        matches!(self, Constant::Bottom)
    }

    fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (Constant::Bottom, v) | (v, Constant::Bottom) => *v,
            (Constant::Value(a), Constant::Value(b)) if a == b => *self,
            _ => Constant::Top,
        }
    }
}

/// Constant propagation
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantPropagation;

impl ConstantPropagation {
    fn lift(value: Option<Const>) -> Constant {
        value.map_or(Constant::Top, Constant::Value)
    }
}

impl Lattice for ConstantPropagation {
    type Value = Constant;

    fn literal(&self, literal: &Literal) -> Constant {
        Self::lift(Const::from_literal(literal))
    }

    fn from_bool(&self, value: bool) -> Constant {
        Constant::Value(Const::Bool(value))
    }

    fn truth(&self, value: &Constant) -> Truth {
        match value {
            Constant::Value(c) => Truth::from_bool(c.is_truthy()),
            _ => Truth::Unknown,
        }
    }

    fn unary(&self, op: UnaryOp, operand: &Constant) -> Constant {
        match operand {
            Constant::Value(c) => Self::lift(eval_unary(op, *c)),
            other => *other,
        }
    }

    fn binary(&self, op: BinaryOp, lhs: &Constant, rhs: &Constant) -> Constant {
        match (lhs, rhs) {
            (Constant::Bottom, _) | (_, Constant::Bottom) => Constant::Bottom,
            (Constant::Value(a), Constant::Value(b)) => Self::lift(eval_binary(op, *a, *b)),
            _ => Constant::Top,
        }
    }

    fn refine(&self, op: BinaryOp, lhs: &Constant, rhs: &Constant) -> Option<Constant> {
        match (lhs, rhs) {
            (Constant::Value(a), Constant::Value(b)) => match eval_binary(op, *a, *b) {
                Some(c) if !c.is_truthy() => None,
                _ => Some(*lhs),
            },
            (Constant::Top, Constant::Value(b)) if op == BinaryOp::Eq => Some(Constant::Value(*b)),
            _ => Some(*lhs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> Constant {
        Constant::Value(Const::Int(n))
    }

    #[test]
    fn test_join() {
        assert_eq!(int(1).join(&int(1)), int(1));
        assert_eq!(int(1).join(&int(2)), Constant::Top);
        assert_eq!(Constant::Bottom.join(&int(2)), int(2));
    }

    #[test]
    fn test_folding() {
        let l = ConstantPropagation;
        assert_eq!(l.binary(BinaryOp::Mul, &int(6), &int(7)), int(42));
        assert_eq!(l.binary(BinaryOp::Div, &int(6), &int(0)), Constant::Top);
        assert_eq!(l.binary(BinaryOp::Add, &Constant::Top, &int(1)), Constant::Top);
        assert_eq!(l.unary(UnaryOp::Neg, &int(3)), int(-3));
    }

    #[test]
    fn test_refine() {
        let l = ConstantPropagation;
        assert_eq!(l.refine(BinaryOp::Eq, &Constant::Top, &int(4)), Some(int(4)));
        assert_eq!(l.refine(BinaryOp::Lt, &int(5), &int(4)), None);
        assert_eq!(l.refine(BinaryOp::Lt, &int(3), &int(4)), Some(int(3)));
    }
}
