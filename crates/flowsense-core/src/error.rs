//! Error types for the dataflow engine
//!
//! Only caller contract breaches surface as [`TransferError`]. Everything
//! else the engine meets (unsupported constructs, absent environments, join
//! conflicts) is absorbed locally and costs precision, not an error.

use thiserror::Error;

use crate::ast::{FunctionId, StmtId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// The CFG never emits this node kind standalone; callers walking the
    /// tree by hand must unwrap it first.
    #[error("statement {stmt} is an elided {kind} node and cannot be transferred")]
    ElidedNode { stmt: StmtId, kind: &'static str },
}

/// Signals raised by the inlining call stack
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("inlining {callee:?} would exceed the maximum call depth of {limit}")]
    RecursionLimitExceeded { callee: FunctionId, limit: usize },
    #[error("no inlined frame to pop")]
    EmptyCallStack,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
