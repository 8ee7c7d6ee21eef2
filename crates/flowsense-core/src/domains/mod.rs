//! Stock lattices
//!
//! Ready-made [`Lattice`](crate::lattice::Lattice) implementations for the
//! common checker needs:
//! - [`flat::ConstantPropagation`]: single known constant or unknown
//! - [`value_set::PossibleValues`]: small sets of possible constants
//! - [`interval::Intervals`]: integer ranges with widening

pub mod flat;
pub mod interval;
pub mod value_set;

use std::fmt;

use crate::ast::{BinaryOp, Literal, UnaryOp};

/// Concrete scalar shared by the constant-based domains
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Const {
    Bool(bool),
    Int(i64),
}

impl Const {
    pub fn from_literal(literal: &Literal) -> Option<Const> {
        match literal {
            Literal::Int(n) => Some(Const::Int(*n)),
            Literal::Bool(b) => Some(Const::Bool(*b)),
            Literal::Null => None,
        }
    }

    pub fn as_int(self) -> i64 {
        match self {
            Const::Int(n) => n,
            Const::Bool(b) => i64::from(b),
        }
    }

    pub fn is_truthy(self) -> bool {
        self.as_int() != 0
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Bool(b) => write!(f, "{}", b),
            Const::Int(n) => write!(f, "{}", n),
        }
    }
}

/// Concrete evaluation of a unary operator; `None` on overflow
pub(crate) fn eval_unary(op: UnaryOp, operand: Const) -> Option<Const> {
    match op {
        UnaryOp::Not => Some(Const::Bool(!operand.is_truthy())),
        UnaryOp::Neg => operand.as_int().checked_neg().map(Const::Int),
        UnaryOp::BitNot => Some(Const::Int(!operand.as_int())),
    }
}

/// Concrete evaluation of a binary operator; `None` for undefined results
/// (division by zero, overflow, oversized shifts)
pub(crate) fn eval_binary(op: BinaryOp, lhs: Const, rhs: Const) -> Option<Const> {
    if let (Const::Bool(a), Const::Bool(b)) = (lhs, rhs) {
        match op {
            BinaryOp::Eq => return Some(Const::Bool(a == b)),
            BinaryOp::Ne => return Some(Const::Bool(a != b)),
            _ => {}
        }
    }
    let (a, b) = (lhs.as_int(), rhs.as_int());
    let result = match op {
        BinaryOp::Add => Const::Int(a.checked_add(b)?),
        BinaryOp::Sub => Const::Int(a.checked_sub(b)?),
        BinaryOp::Mul => Const::Int(a.checked_mul(b)?),
        BinaryOp::Div => Const::Int(a.checked_div(b)?),
        BinaryOp::Rem => Const::Int(a.checked_rem(b)?),
        BinaryOp::BitAnd => Const::Int(a & b),
        BinaryOp::BitOr => Const::Int(a | b),
        BinaryOp::BitXor => Const::Int(a ^ b),
        BinaryOp::Shl => Const::Int(a.checked_shl(u32::try_from(b).ok()?)?),
        BinaryOp::Shr => Const::Int(a.checked_shr(u32::try_from(b).ok()?)?),
        BinaryOp::Eq => Const::Bool(a == b),
        BinaryOp::Ne => Const::Bool(a != b),
        BinaryOp::Lt => Const::Bool(a < b),
        BinaryOp::Le => Const::Bool(a <= b),
        BinaryOp::Gt => Const::Bool(a > b),
        BinaryOp::Ge => Const::Bool(a >= b),
    };
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_arithmetic() {
        assert_eq!(eval_binary(BinaryOp::Add, Const::Int(2), Const::Int(3)), Some(Const::Int(5)));
        assert_eq!(eval_binary(BinaryOp::Div, Const::Int(1), Const::Int(0)), None);
        assert_eq!(eval_binary(BinaryOp::Add, Const::Int(i64::MAX), Const::Int(1)), None);
        assert_eq!(eval_binary(BinaryOp::Shl, Const::Int(1), Const::Int(-1)), None);
    }

    #[test]
    fn test_eval_comparisons() {
        assert_eq!(eval_binary(BinaryOp::Lt, Const::Int(2), Const::Int(3)), Some(Const::Bool(true)));
        assert_eq!(
            eval_binary(BinaryOp::Eq, Const::Bool(true), Const::Bool(false)),
            Some(Const::Bool(false))
        );
        assert_eq!(eval_unary(UnaryOp::Not, Const::Int(0)), Some(Const::Bool(true)));
        assert_eq!(eval_unary(UnaryOp::Neg, Const::Int(i64::MIN)), None);
    }
}
