//! Integer interval lattice
//!
//! Tracks a lower and upper bound per value. Intervals have infinite height,
//! so the lattice asks the solver to widen at loop heads after a short delay.

use std::cmp::{max, min};
use std::fmt;

use crate::ast::{BinaryOp, Literal, UnaryOp};
use crate::lattice::{AbstractValue, Lattice, Truth};

/// Bound of an interval: -∞, finite value, or +∞
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bound {
    NegInf,
    Finite(i64),
    PosInf,
}

impl Bound {
    pub fn as_finite(&self) -> Option<i64> {
        match self {
            Bound::Finite(n) => Some(*n),
            _ => None,
        }
    }

    fn is_negative(&self) -> bool {
        match self {
            Bound::NegInf => true,
            Bound::Finite(n) => *n < 0,
            Bound::PosInf => false,
        }
    }

    /// Overflowing finite arithmetic escapes to the infinity of its sign
    fn overflow(sign_negative: bool) -> Bound {
        if sign_negative { Bound::NegInf } else { Bound::PosInf }
    }

    pub fn add(&self, other: &Bound) -> Bound {
        match (self, other) {
            (Bound::Finite(a), Bound::Finite(b)) => a
                .checked_add(*b)
                .map_or_else(|| Bound::overflow(*a < 0), Bound::Finite),
            (Bound::NegInf, Bound::PosInf) | (Bound::PosInf, Bound::NegInf) => Bound::PosInf,
            (Bound::NegInf, _) | (_, Bound::NegInf) => Bound::NegInf,
            (Bound::PosInf, _) | (_, Bound::PosInf) => Bound::PosInf,
        }
    }

    pub fn sub(&self, other: &Bound) -> Bound {
        self.add(&other.neg())
    }

    pub fn mul(&self, other: &Bound) -> Bound {
        match (self, other) {
            (Bound::Finite(a), Bound::Finite(b)) => a
                .checked_mul(*b)
                .map_or_else(|| Bound::overflow((*a < 0) != (*b < 0)), Bound::Finite),
            (Bound::Finite(0), _) | (_, Bound::Finite(0)) => Bound::Finite(0),
            _ => Bound::overflow(self.is_negative() != other.is_negative()),
        }
    }

    pub fn neg(&self) -> Bound {
        match self {
            Bound::NegInf => Bound::PosInf,
            Bound::Finite(n) => n.checked_neg().map_or(Bound::PosInf, Bound::Finite),
            Bound::PosInf => Bound::NegInf,
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::NegInf => write!(f, "-∞"),
            Bound::Finite(n) => write!(f, "{}", n),
            Bound::PosInf => write!(f, "+∞"),
        }
    }
}

/// `[low, high]`; any interval with `low > high` is the empty (bottom) one
#[derive(Debug, Clone, Copy, Eq)]
pub struct Interval {
    pub low: Bound,
    pub high: Bound,
}

impl PartialEq for Interval {
    fn eq(&self, other: &Self) -> bool {
        (self.is_empty() && other.is_empty()) || (self.low == other.low && self.high == other.high)
    }
}

impl Interval {
    pub fn new(low: Bound, high: Bound) -> Self {
        if low > high { Self::empty() } else { Self { low, high } }
    }

    pub fn constant(value: i64) -> Self {
        Self::new(Bound::Finite(value), Bound::Finite(value))
    }

    pub fn range(low: i64, high: i64) -> Self {
        Self::new(Bound::Finite(low), Bound::Finite(high))
    }

    fn empty() -> Self {
        Self {
            low: Bound::PosInf,
            high: Bound::NegInf,
        }
    }

    fn boolean() -> Self {
        Self::range(0, 1)
    }

    pub fn is_empty(&self) -> bool {
        self.low > self.high
    }

    pub fn contains(&self, value: i64) -> bool {
        !self.is_empty() && self.low <= Bound::Finite(value) && Bound::Finite(value) <= self.high
    }

    pub fn as_constant(&self) -> Option<i64> {
        match (self.low, self.high) {
            (Bound::Finite(l), Bound::Finite(h)) if l == h => Some(l),
            _ => None,
        }
    }

    pub fn meet(&self, other: &Interval) -> Interval {
        Interval::new(max(self.low, other.low), min(self.high, other.high))
    }

    fn add(&self, other: &Interval) -> Interval {
        Interval::new(self.low.add(&other.low), self.high.add(&other.high))
    }

    fn sub(&self, other: &Interval) -> Interval {
        Interval::new(self.low.sub(&other.high), self.high.sub(&other.low))
    }

    fn mul(&self, other: &Interval) -> Interval {
        let products = [
            self.low.mul(&other.low),
            self.low.mul(&other.high),
            self.high.mul(&other.low),
            self.high.mul(&other.high),
        ];
        let low = products.iter().copied().min().unwrap_or(Bound::NegInf);
        let high = products.iter().copied().max().unwrap_or(Bound::PosInf);
        Interval::new(low, high)
    }

    fn neg(&self) -> Interval {
        Interval::new(self.high.neg(), self.low.neg())
    }

    /// Definite outcome of `self op other`, if the ranges decide it
    fn compare(&self, op: BinaryOp, other: &Interval) -> Truth {
        let (a, b) = (self, other);
        match op {
            BinaryOp::Lt if a.high < b.low => Truth::True,
            BinaryOp::Lt if a.low >= b.high => Truth::False,
            BinaryOp::Le if a.high <= b.low => Truth::True,
            BinaryOp::Le if a.low > b.high => Truth::False,
            BinaryOp::Gt => b.compare(BinaryOp::Lt, a),
            BinaryOp::Ge => b.compare(BinaryOp::Le, a),
            BinaryOp::Eq | BinaryOp::Ne => {
                let eq = match (a.as_constant(), b.as_constant()) {
                    (Some(x), Some(y)) if x == y => Truth::True,
                    _ if a.meet(b).is_empty() => Truth::False,
                    _ => Truth::Unknown,
                };
                if op == BinaryOp::Eq { eq } else { eq.negate() }
            }
            _ => Truth::Unknown,
        }
    }

    fn truth(&self) -> Truth {
        if self.is_empty() {
            Truth::Unknown
        } else if !self.contains(0) {
            Truth::True
        } else if self.as_constant() == Some(0) {
            Truth::False
        } else {
            Truth::Unknown
        }
    }

    fn from_truth(truth: Truth) -> Interval {
        match truth {
            Truth::True => Interval::constant(1),
            Truth::False => Interval::constant(0),
            Truth::Unknown => Interval::boolean(),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "⊥")
        } else {
            write!(f, "[{}, {}]", self.low, self.high)
        }
    }
}

impl AbstractValue for Interval {
    fn top() -> Self {
        Self {
            low: Bound::NegInf,
            high: Bound::PosInf,
        }
    }

    fn bottom() -> Self {
        Self::empty()
    }

    fn is_top(&self) -> bool {
        self.low == Bound::NegInf && self.high == Bound::PosInf
    }

    fn is_bottom(&self) -> bool {
        self.is_empty()
    }

    fn join(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Interval {
            low: min(self.low, other.low),
            high: max(self.high, other.high),
        }
    }

    fn widen(&self, next: &Self) -> Self {
        if self.is_empty() {
            return *next;
        }
        if next.is_empty() {
            return *self;
        }
        let low = if next.low < self.low { Bound::NegInf } else { self.low };
        let high = if next.high > self.high { Bound::PosInf } else { self.high };
        Interval { low, high }
    }
}

/// Interval analysis; booleans are the range `[0, 1]`
#[derive(Debug, Clone, Copy)]
pub struct Intervals {
    pub widening_delay: usize,
}

impl Default for Intervals {
    fn default() -> Self {
        Self { widening_delay: 2 }
    }
}

impl Lattice for Intervals {
    type Value = Interval;

    fn literal(&self, literal: &Literal) -> Interval {
        match literal {
            Literal::Int(n) => Interval::constant(*n),
            Literal::Bool(b) => Interval::constant(i64::from(*b)),
            Literal::Null => Interval::top(),
        }
    }

    fn from_bool(&self, value: bool) -> Interval {
        Interval::constant(i64::from(value))
    }

    fn truth(&self, value: &Interval) -> Truth {
        value.truth()
    }

    fn unary(&self, op: UnaryOp, operand: &Interval) -> Interval {
        if operand.is_empty() {
            return Interval::bottom();
        }
        match op {
            UnaryOp::Neg => operand.neg(),
            UnaryOp::Not => Interval::from_truth(operand.truth().negate()),
            UnaryOp::BitNot => Interval::top(),
        }
    }

    fn binary(&self, op: BinaryOp, lhs: &Interval, rhs: &Interval) -> Interval {
        if lhs.is_empty() || rhs.is_empty() {
            return Interval::bottom();
        }
        match op {
            BinaryOp::Add => lhs.add(rhs),
            BinaryOp::Sub => lhs.sub(rhs),
            BinaryOp::Mul => lhs.mul(rhs),
            op if op.is_comparison() => Interval::from_truth(lhs.compare(op, rhs)),
            _ => Interval::top(),
        }
    }

    fn refine(&self, op: BinaryOp, lhs: &Interval, rhs: &Interval) -> Option<Interval> {
        let one = Bound::Finite(1);
        let refined = match op {
            BinaryOp::Lt => lhs.meet(&Interval::new(Bound::NegInf, rhs.high.sub(&one))),
            BinaryOp::Le => lhs.meet(&Interval::new(Bound::NegInf, rhs.high)),
            BinaryOp::Gt => lhs.meet(&Interval::new(rhs.low.add(&one), Bound::PosInf)),
            BinaryOp::Ge => lhs.meet(&Interval::new(rhs.low, Bound::PosInf)),
            BinaryOp::Eq => lhs.meet(rhs),
            BinaryOp::Ne => match rhs.as_constant() {
                Some(c) if lhs.low == Bound::Finite(c) => Interval::new(lhs.low.add(&one), lhs.high),
                Some(c) if lhs.high == Bound::Finite(c) => Interval::new(lhs.low, lhs.high.sub(&one)),
                _ => *lhs,
            },
            _ => *lhs,
        };
        if refined.is_empty() { None } else { Some(refined) }
    }

    fn widening_delay(&self) -> Option<usize> {
        Some(self.widening_delay)
    }
}
