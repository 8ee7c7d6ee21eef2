//! Lattice boundary between the engine and checker-supplied domains
//!
//! The engine stores [`Value`]s, a tagged variant whose structural cases
//! (pointers, aggregates) it understands itself and whose scalar case wraps
//! an element of the checker's [`Lattice`]:
//! - Bottom (⊥) = unreachable / no value has flowed here yet
//! - Top (⊤) = unknown, or conflicting variants met at a merge point
//! - Scalar, Pointer and Aggregate form the middle of the lattice

use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::fmt;

use crate::ast::{BinaryOp, Literal, UnaryOp};
use crate::storage::StorageLocation;

/// Minimal surface an abstract scalar must offer
pub trait AbstractValue: Clone + PartialEq + fmt::Debug {
    fn top() -> Self;
    fn bottom() -> Self;
    fn is_top(&self) -> bool;
    fn is_bottom(&self) -> bool;
    /// Least upper bound
    fn join(&self, other: &Self) -> Self;
    /// Widening of `self` (previous iterate) by `next`. Finite-height
    /// domains can keep the default, which is plain join.
    fn widen(&self, next: &Self) -> Self {
        self.join(next)
    }
}

/// Three-valued truth of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    Unknown,
}

impl Truth {
    pub fn from_bool(b: bool) -> Self {
        if b { Truth::True } else { Truth::False }
    }

    pub fn negate(self) -> Self {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Unknown => Truth::Unknown,
        }
    }

    pub fn may_be(self, b: bool) -> bool {
        self == Truth::Unknown || self == Truth::from_bool(b)
    }
}

/// How stores through pointers affect other locations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasModel {
    /// Follow may-point-to sets: strong update for a single target, weak
    /// update for several, havoc of address-taken locations for unknown
    PointsTo,
    /// Any store through a pointer sends every address-taken location to ⊤
    Conservative,
}

/// Categories of locations an opaque call may clobber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEffect {
    Globals,
    /// Locations that escaped through an earlier opaque call, or that a
    /// global or escaped location points to
    Escaped,
    /// Locations reachable from the call's pointer arguments
    PointerArguments,
}

/// Checker-supplied abstract domain
///
/// Only `literal` and `from_bool` are mandatory; every other hook has a
/// conservative default, so a domain that only cares about a handful of
/// operations stays small.
pub trait Lattice {
    type Value: AbstractValue;

    /// Abstraction of an integer or boolean literal. Null pointers are
    /// modelled by the engine and never reach this hook.
    fn literal(&self, literal: &Literal) -> Self::Value;

    fn from_bool(&self, value: bool) -> Self::Value;

    fn truth(&self, _value: &Self::Value) -> Truth {
        Truth::Unknown
    }

    fn unary(&self, _op: UnaryOp, _operand: &Self::Value) -> Self::Value {
        Self::Value::top()
    }

    fn binary(&self, _op: BinaryOp, _lhs: &Self::Value, _rhs: &Self::Value) -> Self::Value {
        Self::Value::top()
    }

    /// Narrow `lhs` under the assumption that `lhs op rhs` holds.
    /// `None` means the assumption cannot hold and the edge is infeasible.
    fn refine(&self, _op: BinaryOp, lhs: &Self::Value, _rhs: &Self::Value) -> Option<Self::Value> {
        Some(lhs.clone())
    }

    /// Number of visits to a loop head before the solver widens instead of
    /// joining; `None` for domains of finite height that never need it
    fn widening_delay(&self) -> Option<usize> {
        None
    }

    fn alias_model(&self) -> AliasModel {
        AliasModel::PointsTo
    }

    /// Whether an opaque call invalidates locations of the given category
    fn call_invalidates(&self, _effect: CallEffect) -> bool {
        true
    }
}

/// May-point-to descriptor
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PointsTo {
    pub targets: BTreeSet<StorageLocation>,
    pub may_be_null: bool,
}

impl PointsTo {
    pub fn to(target: StorageLocation) -> Self {
        Self {
            targets: BTreeSet::from([target]),
            may_be_null: false,
        }
    }

    pub fn null() -> Self {
        Self {
            targets: BTreeSet::new(),
            may_be_null: true,
        }
    }

    pub fn is_null(&self) -> bool {
        self.targets.is_empty() && self.may_be_null
    }

    /// Truth of the pointer used as a condition
    pub fn truth(&self) -> Truth {
        match (self.targets.is_empty(), self.may_be_null) {
            (true, true) => Truth::False,
            (false, false) => Truth::True,
            _ => Truth::Unknown,
        }
    }

    pub fn union(&self, other: &PointsTo) -> PointsTo {
        PointsTo {
            targets: self.targets.union(&other.targets).copied().collect(),
            may_be_null: self.may_be_null || other.may_be_null,
        }
    }
}

/// Record value: field name to the location holding that field
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Aggregate {
    pub fields: IndexMap<String, StorageLocation>,
}

/// Value stored at a location
#[derive(Debug, Clone, PartialEq)]
pub enum Value<V> {
    Bottom,
    Top,
    Scalar(V),
    Pointer(PointsTo),
    Aggregate(Aggregate),
}

impl<V: AbstractValue> Value<V> {
    /// Wrap a scalar, collapsing the domain's own ⊤/⊥ into the engine's
    pub fn scalar(v: V) -> Self {
        if v.is_bottom() {
            Value::Bottom
        } else if v.is_top() {
            Value::Top
        } else {
            Value::Scalar(v)
        }
    }

    pub fn is_top(&self) -> bool {
        matches!(self, Value::Top)
    }

    pub fn is_bottom(&self) -> bool {
        matches!(self, Value::Bottom)
    }

    /// Scalar view: ⊤/⊥ map to the domain's ⊤/⊥, structural cases to ⊤
    pub fn as_scalar(&self) -> V {
        match self {
            Value::Scalar(v) => v.clone(),
            Value::Bottom => V::bottom(),
            _ => V::top(),
        }
    }

    pub fn as_pointer(&self) -> Option<&PointsTo> {
        match self {
            Value::Pointer(p) => Some(p),
            _ => None,
        }
    }

    pub fn join(&self, other: &Value<V>) -> Value<V> {
        match (self, other) {
            // Bottom is identity for join
            (Value::Bottom, v) | (v, Value::Bottom) => v.clone(),
            // Top absorbs everything
            (Value::Top, _) | (_, Value::Top) => Value::Top,
            (Value::Scalar(a), Value::Scalar(b)) => Value::scalar(a.join(b)),
            (Value::Pointer(a), Value::Pointer(b)) => Value::Pointer(a.union(b)),
            (Value::Aggregate(a), Value::Aggregate(b)) if a == b => Value::Aggregate(a.clone()),
            // Variant conflict
            _ => Value::Top,
        }
    }

    /// Widen `self` (previous) by `next`. Only scalars can grow without
    /// bound: pointer targets are drawn from a finite arena.
    pub fn widen(&self, next: &Value<V>) -> Value<V> {
        match (self, next) {
            (Value::Scalar(a), Value::Scalar(b)) => Value::scalar(a.widen(b)),
            _ => self.join(next),
        }
    }
}

impl<V: AbstractValue> Default for Value<V> {
    fn default() -> Self {
        Value::Top
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::flat::Constant;
    use crate::domains::Const;

    type V = Value<Constant>;

    fn int(n: i64) -> V {
        Value::scalar(Constant::Value(Const::Int(n)))
    }

    #[test]
    fn test_value_join_identity_and_absorption() {
        assert_eq!(V::Bottom.join(&int(1)), int(1));
        assert_eq!(int(1).join(&V::Bottom), int(1));
        assert_eq!(V::Top.join(&int(1)), V::Top);
        assert_eq!(int(1).join(&int(1)), int(1));
        assert_eq!(int(1).join(&int(2)), V::Top);
    }

    #[test]
    fn test_variant_conflict_is_top() {
        let ptr = V::Pointer(PointsTo::null());
        assert_eq!(ptr.join(&int(0)), V::Top);
        let agg = V::Aggregate(Aggregate::default());
        assert_eq!(agg.join(&ptr), V::Top);
    }

    #[test]
    fn test_pointer_join_unions_targets() {
        let a = V::Pointer(PointsTo::to(StorageLocation(1)));
        let b = V::Pointer(PointsTo::null());
        let joined = a.join(&b);
        let p = joined.as_pointer().unwrap();
        assert!(p.targets.contains(&StorageLocation(1)));
        assert!(p.may_be_null);
        assert_eq!(p.truth(), Truth::Unknown);
    }

    #[test]
    fn test_scalar_normalizes() {
        assert_eq!(V::scalar(Constant::Top), V::Top);
        assert_eq!(V::scalar(Constant::Bottom), V::Bottom);
    }

    #[test]
    fn test_truth() {
        assert_eq!(Truth::True.negate(), Truth::False);
        assert!(Truth::Unknown.may_be(true));
        assert!(!Truth::False.may_be(true));
        assert_eq!(PointsTo::null().truth(), Truth::False);
        assert_eq!(PointsTo::to(StorageLocation(0)).truth(), Truth::True);
    }
}
