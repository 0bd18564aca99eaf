//! High-level frame API over the remex expression engine
//!
//! This crate wraps the DAG core in a frame-shaped surface: column
//! selection, row slicing, elementwise arithmetic via operator overloads,
//! reductions, renames and pushed-down column functions. All composition is
//! lazy; remote work happens only on demand.

mod error;
mod frame;
pub mod lambda;

pub use error::{Error, Result};
pub use frame::Frame;
pub use lambda::{BinaryOp, ColumnExpr, ColumnFn, CompareOp, UnaryOp};

// Re-export the core types a frame user touches directly.
pub use remex_core::{ColumnType, ExecutionService, Scalar, Session};
