//! Execution service contract
//!
//! The engine consumes a stateful remote compute service through this trait;
//! it never implements one. The response shape is a tagged variant decoded
//! once at the transport boundary: a structured evaluation error arrives as
//! [`Error::RemoteEvaluation`], a transport failure as
//! [`Error::RemoteConnection`].
//!
//! [`Error::RemoteEvaluation`]: crate::error::Error::RemoteEvaluation
//! [`Error::RemoteConnection`]: crate::error::Error::RemoteConnection

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cache::{ColumnType, Scalar};
use crate::error::Result;

/// Successful result of evaluating an expression remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EvalOutcome {
    /// The expression reduced to a scalar or a small literal list,
    /// pulled to the client directly.
    Scalar(Scalar),

    /// The expression produced a remote table; only identity and shape
    /// come back, schema and sample rows are fetched on first access.
    Handle {
        /// Remote object name assigned by the service
        id: String,
        /// Row count of the result
        nrows: u64,
        /// Column count of the result
        ncols: u64,
    },
}

/// Schema and preview metadata for a materialized remote object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSchema {
    /// Row count
    pub nrows: u64,

    /// Column count
    pub ncols: u64,

    /// Ordered column names
    pub names: Vec<String>,

    /// Column name to semantic type tag
    pub types: HashMap<String, ColumnType>,

    /// Row-limited window of actual data for previews
    pub sample: Vec<Vec<serde_json::Value>>,
}

/// The remote compute/storage service consumed by the engine.
///
/// All three calls block until the service responds; retry policy belongs
/// to the transport layer behind an implementation, not to the engine.
#[cfg_attr(test, mockall::automock)]
pub trait ExecutionService: Send + Sync {
    /// Evaluate an expression string, returning a scalar payload or a
    /// remote handle with shape metadata.
    fn evaluate(&self, expr: &str) -> Result<EvalOutcome>;

    /// Fetch schema and up to `sample_rows` preview rows for a handle.
    fn fetch_schema(&self, handle: &str, sample_rows: usize) -> Result<RemoteSchema>;

    /// Delete a remote object. Best-effort; the engine never retries.
    fn free(&self, handle: &str) -> Result<()>;
}
