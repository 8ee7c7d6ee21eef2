//! Flow-sensitive dataflow engine for static checkers
//!
//! This crate provides the core of a forward abstract interpreter over a
//! C-like statement tree:
//! - Control Flow Graph construction with short-circuit lowering
//! - Copy-on-write environments mapping variables to storage locations and values
//! - A transfer function that applies one CFG element at a time
//! - A statement-to-environment index for operands that live in other blocks
//! - A worklist-based fixpoint solver with edge narrowing and widening
//! - Pluggable checker domains through the [`Lattice`] trait
//!
//! Checkers pick (or write) a [`Lattice`], then either run
//! [`DataflowAnalysis`] on a whole function or drive [`transfer`] themselves.

pub mod analysis;
pub mod ast;
pub mod cfg;
pub mod config;
pub mod context;
pub mod domains;
pub mod elide;
pub mod environment;
pub mod error;
pub mod lattice;
pub mod solver;
pub mod stmt_env;
pub mod storage;
pub mod transfer;

pub use analysis::DataflowAnalysis;
pub use ast::{DeclId, FunctionId, Program, StmtId, StmtKind, Type};
pub use cfg::{BasicBlock, BlockId, Cfg, CfgBuilder, Terminator};
pub use config::{ContextSensitivity, DataflowOptions};
pub use context::DataflowContext;
pub use elide::skip_cleanup_wrapper;
pub use environment::Environment;
pub use error::{ConfigError, FrameError, TransferError};
pub use lattice::{AbstractValue, AliasModel, CallEffect, Lattice, PointsTo, Truth, Value};
pub use solver::{FixpointResult, FixpointSolver};
pub use stmt_env::{BlockStmtEnvs, EmptyStmtEnvMap, StmtToEnvMap};
pub use storage::{Entity, StorageLocation};
pub use transfer::{assume, transfer};
