//! Per-node cache of remote identity, shape and schema metadata
//!
//! Every DAG node owns exactly one [`MetaCache`]. The cache is in one of
//! three mutually exclusive states: empty (nothing known), scalar-valued
//! (the expression produced a small local value) or handle-valued (the
//! expression was materialized under a remote name). A handle-valued cache
//! may additionally carry any subset of shape, schema and sample fields,
//! each independently known or unknown.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::literal::Literal;
use crate::service::RemoteSchema;

/// A scalar (or small literal list) result of a remote evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    /// Numeric result
    Num(f64),

    /// String result
    Str(String),

    /// Boolean result
    Bool(bool),

    /// Small numeric list result
    Nums(Vec<f64>),
}

impl Scalar {
    /// The literal form of this scalar, for inlining into expression text.
    pub fn as_literal(&self) -> Literal {
        match self {
            Scalar::Num(v) => Literal::Num(*v),
            Scalar::Str(v) => Literal::Str(v.clone()),
            Scalar::Bool(v) => Literal::Bool(*v),
            Scalar::Nums(v) => v.clone().into(),
        }
    }

    /// The numeric value, if this scalar is numeric.
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Scalar::Num(v) => Some(*v),
            _ => None,
        }
    }
}

/// Semantic column type tag reported by the execution service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Numeric column
    Numeric,

    /// Categorical (factor) column
    Categorical,

    /// Free-form string column
    String,

    /// Time/timestamp column
    Time,

    /// UUID column
    Uuid,
}

/// Cached metadata for one DAG node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaCache {
    /// Scalar result; mutually exclusive with `remote_id`
    scalar: Option<Scalar>,

    /// Name of the materialized remote object, if any
    remote_id: Option<String>,

    /// Row count; `None` means unknown, must be fetched
    nrows: Option<u64>,

    /// Column count; `None` means unknown, must be fetched
    ncols: Option<u64>,

    /// Ordered column names, unique within a node
    names: Option<Vec<String>>,

    /// Column name to semantic type tag
    types: Option<HashMap<String, ColumnType>>,

    /// Small materialized row window for previews
    sample: Option<Vec<Vec<serde_json::Value>>>,
}

impl MetaCache {
    /// A cache in the empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache that starts handle-valued, for nodes that reference a
    /// pre-existing remote object by name.
    pub fn for_remote(remote_id: &str) -> Self {
        Self {
            remote_id: Some(remote_id.to_string()),
            ..Self::default()
        }
    }

    /// True when neither a scalar nor a remote handle is cached.
    pub fn is_empty(&self) -> bool {
        self.scalar.is_none() && self.remote_id.is_none()
    }

    /// True when a scalar result is cached.
    pub fn is_scalar(&self) -> bool {
        self.scalar.is_some()
    }

    /// True when a remote handle is cached.
    pub fn is_handle(&self) -> bool {
        self.remote_id.is_some()
    }

    /// The cached scalar result, if any.
    pub fn scalar(&self) -> Option<&Scalar> {
        self.scalar.as_ref()
    }

    /// The cached remote object name, if any.
    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    /// The cached row count, if known.
    pub fn nrows(&self) -> Option<u64> {
        self.nrows
    }

    /// The cached column count, if known.
    pub fn ncols(&self) -> Option<u64> {
        self.ncols
    }

    /// The cached column names, if known.
    pub fn names(&self) -> Option<&[String]> {
        self.names.as_deref()
    }

    /// The cached column types, if known.
    pub fn types(&self) -> Option<&HashMap<String, ColumnType>> {
        self.types.as_ref()
    }

    /// The cached preview rows, if any.
    pub fn sample(&self) -> Option<&[Vec<serde_json::Value>]> {
        self.sample.as_ref().map(Vec::as_slice)
    }

    /// Transition to the scalar-valued state.
    pub fn set_scalar(&mut self, value: Scalar) {
        debug_assert!(self.remote_id.is_none(), "cache is already handle-valued");
        self.scalar = Some(value);
    }

    /// Transition to the handle-valued state with known shape.
    pub fn set_handle(&mut self, remote_id: String, nrows: u64, ncols: u64) {
        debug_assert!(self.scalar.is_none(), "cache is already scalar-valued");
        self.remote_id = Some(remote_id);
        self.nrows = Some(nrows);
        self.ncols = Some(ncols);
    }

    /// Transition to the handle-valued state with shape still unknown.
    /// Used when a pin assignment is committed after a successful evaluation.
    pub fn set_remote_id(&mut self, remote_id: String) {
        debug_assert!(self.scalar.is_none(), "cache is already scalar-valued");
        self.remote_id = Some(remote_id);
    }

    /// Fill shape, schema and sample fields from a fetched remote schema.
    pub fn set_schema(&mut self, schema: RemoteSchema) {
        self.nrows = Some(schema.nrows);
        self.ncols = Some(schema.ncols);
        self.names = Some(schema.names);
        self.types = Some(schema.types);
        self.sample = Some(schema.sample);
    }

    /// Replace the cached column names without touching anything else.
    /// Used for name-only updates whose new names are valid by construction.
    pub fn set_names(&mut self, names: Vec<String>) {
        self.names = Some(names);
    }

    /// Invalidate everything except the remote identity. Used when an
    /// operation changes the semantics of the remote object without
    /// changing which object it is.
    pub fn flush(&mut self) {
        self.scalar = None;
        self.nrows = None;
        self.ncols = None;
        self.names = None;
        self.types = None;
        self.sample = None;
    }

    /// Reset to the empty state, dropping the remote identity as well.
    /// Used after the remote object has been freed.
    pub fn clear(&mut self) {
        self.remote_id = None;
        self.flush();
    }

    /// One-time copy of known-valid shape fields from a predecessor's
    /// cache, at construction time. Never aliases the other cache.
    pub fn seed_shape_from(&mut self, other: &MetaCache) {
        self.nrows = other.nrows;
        self.ncols = other.ncols;
    }
}
