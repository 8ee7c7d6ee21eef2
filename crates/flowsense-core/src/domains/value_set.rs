//! Bounded sets of possible constants
//!
//! Keeps every value a variable may hold until the set outgrows
//! [`MAX_TRACKED_VALUES`], then gives up to ⊤. The cap also bounds the
//! lattice height, so loops converge without widening.

use std::collections::BTreeSet;

use super::{eval_binary, eval_unary, Const};
use crate::ast::{BinaryOp, Literal, UnaryOp};
use crate::lattice::{AbstractValue, Lattice, Truth};

pub const MAX_TRACKED_VALUES: usize = 8;

/// `Values(∅)` is bottom
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSet {
    Values(BTreeSet<Const>),
    Top,
}

impl ValueSet {
    pub fn single(c: Const) -> Self {
        ValueSet::Values(BTreeSet::from([c]))
    }

    pub fn of(values: impl IntoIterator<Item = Const>) -> Self {
        Self::capped(values.into_iter().collect())
    }

    fn capped(values: BTreeSet<Const>) -> Self {
        if values.len() > MAX_TRACKED_VALUES {
            ValueSet::Top
        } else {
            ValueSet::Values(values)
        }
    }

    pub fn values(&self) -> Option<&BTreeSet<Const>> {
        match self {
            ValueSet::Values(values) => Some(values),
            ValueSet::Top => None,
        }
    }

    pub fn contains(&self, c: Const) -> bool {
        match self {
            ValueSet::Values(values) => values.contains(&c),
            ValueSet::Top => true,
        }
    }
}

impl AbstractValue for ValueSet {
    fn top() -> Self {
        ValueSet::Top
    }

    fn bottom() -> Self {
        ValueSet::Values(BTreeSet::new())
    }

    fn is_top(&self) -> bool {
        matches!(self, ValueSet::Top)
    }

    fn is_bottom(&self) -> bool {
        matches!(self, ValueSet::Values(v) if v.is_empty())
    }

    fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (ValueSet::Values(a), ValueSet::Values(b)) => Self::capped(a.union(b).copied().collect()),
            _ => ValueSet::Top,
        }
    }
}

/// Possible-values analysis
#[derive(Debug, Clone, Copy, Default)]
pub struct PossibleValues;

impl Lattice for PossibleValues {
    type Value = ValueSet;

    fn literal(&self, literal: &Literal) -> ValueSet {
        Const::from_literal(literal).map_or(ValueSet::Top, ValueSet::single)
    }

    fn from_bool(&self, value: bool) -> ValueSet {
        ValueSet::single(Const::Bool(value))
    }

    fn truth(&self, value: &ValueSet) -> Truth {
        let Some(values) = value.values() else {
            return Truth::Unknown;
        };
        if values.is_empty() {
            Truth::Unknown
        } else if values.iter().all(|c| c.is_truthy()) {
            Truth::True
        } else if values.iter().all(|c| !c.is_truthy()) {
            Truth::False
        } else {
            Truth::Unknown
        }
    }

    fn unary(&self, op: UnaryOp, operand: &ValueSet) -> ValueSet {
        let Some(values) = operand.values() else {
            return ValueSet::Top;
        };
        let mut out = BTreeSet::new();
        for c in values {
            match eval_unary(op, *c) {
                Some(r) => {
                    out.insert(r);
                }
                None => return ValueSet::Top,
            }
        }
        ValueSet::capped(out)
    }

    fn binary(&self, op: BinaryOp, lhs: &ValueSet, rhs: &ValueSet) -> ValueSet {
        let (Some(ls), Some(rs)) = (lhs.values(), rhs.values()) else {
            return ValueSet::Top;
        };
        let mut out = BTreeSet::new();
        for l in ls {
            for r in rs {
                match eval_binary(op, *l, *r) {
                    Some(c) => {
                        out.insert(c);
                    }
                    None => return ValueSet::Top,
                }
                if out.len() > MAX_TRACKED_VALUES {
                    return ValueSet::Top;
                }
            }
        }
        ValueSet::Values(out)
    }

    fn refine(&self, op: BinaryOp, lhs: &ValueSet, rhs: &ValueSet) -> Option<ValueSet> {
        let refined = match (lhs, rhs) {
            (ValueSet::Top, ValueSet::Values(rs)) if op == BinaryOp::Eq => ValueSet::Values(rs.clone()),
            (ValueSet::Top, _) => return Some(ValueSet::Top),
            (ValueSet::Values(ls), ValueSet::Top) => ValueSet::Values(ls.clone()),
            (ValueSet::Values(ls), ValueSet::Values(rs)) => ValueSet::Values(
                ls.iter()
                    .filter(|l| {
                        rs.iter()
                            .any(|r| eval_binary(op, **l, *r).map_or(true, Const::is_truthy))
                    })
                    .copied()
                    .collect(),
            ),
        };
        if refined.is_bottom() { None } else { Some(refined) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> ValueSet {
        ValueSet::of(values.iter().map(|n| Const::Int(*n)))
    }

    #[test]
    fn test_join_unions() {
        assert_eq!(ints(&[2]).join(&ints(&[3])), ints(&[2, 3]));
        assert_eq!(ints(&[2]).join(&ValueSet::bottom()), ints(&[2]));
        assert_eq!(ints(&[2]).join(&ValueSet::Top), ValueSet::Top);
    }

    #[test]
    fn test_join_caps() {
        let a = ints(&[0, 1, 2, 3, 4]);
        let b = ints(&[5, 6, 7, 8]);
        assert_eq!(a.join(&b), ValueSet::Top);
    }

    #[test]
    fn test_binary_product() {
        let l = PossibleValues;
        assert_eq!(l.binary(BinaryOp::Add, &ints(&[1, 2]), &ints(&[10])), ints(&[11, 12]));
        assert_eq!(l.binary(BinaryOp::Div, &ints(&[1]), &ints(&[0, 1])), ValueSet::Top);
    }

    #[test]
    fn test_truth() {
        let l = PossibleValues;
        assert_eq!(l.truth(&ints(&[1, 2])), Truth::True);
        assert_eq!(l.truth(&ints(&[0])), Truth::False);
        assert_eq!(l.truth(&ints(&[0, 1])), Truth::Unknown);
    }

    #[test]
    fn test_refine_filters() {
        let l = PossibleValues;
        assert_eq!(l.refine(BinaryOp::Lt, &ints(&[1, 5, 9]), &ints(&[6])), Some(ints(&[1, 5])));
        assert_eq!(l.refine(BinaryOp::Gt, &ints(&[1]), &ints(&[6])), None);
        assert_eq!(l.refine(BinaryOp::Eq, &ValueSet::Top, &ints(&[4])), Some(ints(&[4])));
    }
}
