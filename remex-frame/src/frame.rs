//! User-facing frame handle over the lazy expression engine
//!
//! A [`Frame`] pairs a DAG node with the session that will evaluate it.
//! Every operation is pure composition returning a new frame; remote work
//! only happens when a concrete value, shape or schema is demanded.

use std::collections::HashMap;
use std::ops;
use std::sync::Arc;

use remex_core::{Child, ColumnType, Literal, Node, Scalar, Session};
use tracing::debug;

use crate::error::{Error, Result};
use crate::lambda::{self, ColumnFn};

/// A lazy handle to a remote tabular value.
#[derive(Debug, Clone)]
pub struct Frame {
    session: Arc<Session>,
    node: Node,
}

impl From<&Frame> for Child {
    fn from(frame: &Frame) -> Self {
        frame.node.clone().into()
    }
}

impl Frame {
    /// Wrap an existing DAG node.
    pub fn new(session: Arc<Session>, node: Node) -> Self {
        Self { session, node }
    }

    /// Reference a pre-existing remote object by its user-assigned name.
    /// The remote object is never auto-freed through this frame.
    pub fn by_name(session: Arc<Session>, name: &str) -> Self {
        Self::new(session, Node::by_name(name))
    }

    /// The underlying DAG node.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Row count, fetching shape metadata on first demand.
    pub fn nrows(&self) -> Result<u64> {
        if let Some(nrows) = self.node.cache_snapshot().nrows() {
            return Ok(nrows);
        }
        let (_, nrows, _) = self.session.handle_of(&self.node)?;
        Ok(nrows)
    }

    /// Column count, fetching shape metadata on first demand.
    pub fn ncols(&self) -> Result<u64> {
        if let Some(ncols) = self.node.cache_snapshot().ncols() {
            return Ok(ncols);
        }
        let (_, _, ncols) = self.session.handle_of(&self.node)?;
        Ok(ncols)
    }

    /// Ordered column names.
    pub fn names(&self) -> Result<Vec<String>> {
        let (names, _) = self.session.schema_of(&self.node)?;
        Ok(names)
    }

    /// Column name to semantic type tag.
    pub fn types(&self) -> Result<HashMap<String, ColumnType>> {
        let (_, types) = self.session.schema_of(&self.node)?;
        Ok(types)
    }

    /// Up to `n` preview rows from the cached sample window, materializing
    /// and fetching the schema if needed.
    pub fn head(&self, n: usize) -> Result<Vec<Vec<serde_json::Value>>> {
        self.session.schema_of(&self.node)?;
        let cache = self.node.cache_snapshot();
        let sample = cache.sample().unwrap_or_default();
        Ok(sample.iter().take(n).cloned().collect())
    }

    /// Select one column by name. Fails locally with
    /// [`Error::ColumnNotFound`] when the column list is already cached and
    /// the name is absent; otherwise the remote service validates.
    pub fn col(&self, name: &str) -> Result<Frame> {
        if let Some(names) = self.node.cache_snapshot().names() {
            if !names.iter().any(|n| n == name) {
                return Err(Error::ColumnNotFound(name.to_string()));
            }
        }
        let node = self
            .session
            .make_node("cols", vec![(&*self).into(), Literal::Str(name.into()).into()]);
        Ok(self.derived(node))
    }

    /// Select one column by zero-based index. Fails locally when the column
    /// count is already cached and the index is out of range.
    pub fn col_at(&self, index: u64) -> Result<Frame> {
        if let Some(ncols) = self.node.cache_snapshot().ncols() {
            if index >= ncols {
                return Err(Error::ColumnNotFound(format!(
                    "index {index} out of range for {ncols} columns"
                )));
            }
        }
        let index = i64::try_from(index)
            .map_err(|_| Error::ColumnNotFound(format!("index {index} out of range")))?;
        let node = self
            .session
            .make_node("cols", vec![(&*self).into(), Literal::Int(index).into()]);
        Ok(self.derived(node))
    }

    /// Select several columns by name.
    pub fn cols(&self, names: &[&str]) -> Result<Frame> {
        if let Some(known) = self.node.cache_snapshot().names() {
            for name in names {
                if !known.iter().any(|n| n == name) {
                    return Err(Error::ColumnNotFound(name.to_string()));
                }
            }
        }
        let list = Literal::List(names.iter().map(|n| Literal::Str(n.to_string())).collect());
        let node = self
            .session
            .make_node("cols", vec![(&*self).into(), list.into()]);
        Ok(self.derived(node))
    }

    /// Select a contiguous row window `[start, start + len)`.
    pub fn row_slice(&self, start: u64, len: u64) -> Frame {
        let range = Literal::Range {
            start,
            len: Some(len),
        };
        let node = self
            .session
            .make_node("rows", vec![(&*self).into(), range.into()]);
        self.derived(node)
    }

    /// Rename all columns. The new name count must match the column count
    /// when it is known; the check is local and costs no remote call. The
    /// resulting frame's shape and names are valid by construction.
    pub fn rename(&self, names: &[&str]) -> Result<Frame> {
        let snapshot = self.node.cache_snapshot();
        if let Some(ncols) = snapshot.ncols() {
            if ncols != names.len() as u64 {
                return Err(Error::ShapeMismatch(format!(
                    "{} columns, {} new names",
                    ncols,
                    names.len()
                )));
            }
        }
        let indices = Literal::Range {
            start: 0,
            len: Some(names.len() as u64),
        };
        let list = Literal::List(names.iter().map(|n| Literal::Str(n.to_string())).collect());
        let node = self.session.make_node(
            "colnames=",
            vec![(&*self).into(), indices.into(), list.into()],
        );
        node.seed_shape_from(&snapshot);
        node.seed_names(names.iter().map(|n| n.to_string()).collect());
        Ok(Frame::new(self.session.clone(), node))
    }

    /// Column-bind another frame onto this one.
    pub fn cbind(&self, other: &Frame) -> Frame {
        let node = self
            .session
            .make_node("cbind", vec![self.into(), other.into()]);
        Frame::new(self.session.clone(), node)
    }

    /// Apply a translated column function over the columns of this frame.
    pub fn apply(&self, f: &ColumnFn) -> Result<Frame> {
        let fun = lambda::translate(f)?;
        let node = self
            .session
            .make_node("apply", vec![(&*self).into(), Literal::Int(2).into(), fun.into()]);
        Ok(Frame::new(self.session.clone(), node))
    }

    fn derived(&self, node: Node) -> Frame {
        Frame::new(self.session.clone(), node)
    }

    /// Elementwise binary operation with this frame on the left.
    fn binop(&self, op: &str, rhs: impl Into<Child>) -> Frame {
        let node = self
            .session
            .make_node(op, vec![(&*self).into(), rhs.into()]);
        node.seed_shape_from(&self.node.cache_snapshot());
        Frame::new(self.session.clone(), node)
    }

    /// Elementwise binary operation with this frame on the right.
    fn rbinop(&self, op: &str, lhs: impl Into<Child>) -> Frame {
        let node = self
            .session
            .make_node(op, vec![lhs.into(), (&*self).into()]);
        node.seed_shape_from(&self.node.cache_snapshot());
        Frame::new(self.session.clone(), node)
    }

    /// Elementwise `<`.
    pub fn lt(&self, rhs: impl Into<Child>) -> Frame {
        self.binop("<", rhs)
    }

    /// Elementwise `<=`.
    pub fn le(&self, rhs: impl Into<Child>) -> Frame {
        self.binop("<=", rhs)
    }

    /// Elementwise `>`.
    pub fn gt(&self, rhs: impl Into<Child>) -> Frame {
        self.binop(">", rhs)
    }

    /// Elementwise `>=`.
    pub fn ge(&self, rhs: impl Into<Child>) -> Frame {
        self.binop(">=", rhs)
    }

    /// Elementwise `==`.
    pub fn eq(&self, rhs: impl Into<Child>) -> Frame {
        self.binop("==", rhs)
    }

    /// Elementwise `!=`.
    pub fn ne(&self, rhs: impl Into<Child>) -> Frame {
        self.binop("!=", rhs)
    }

    fn reduce(&self, op: &str) -> Result<f64> {
        let node = self
            .session
            .make_node(op, vec![(&*self).into(), Literal::Bool(false).into()]);
        let value = self.session.value_of(&node)?;
        value
            .as_num()
            .ok_or_else(|| Error::UnexpectedResult(format!("`{op}` did not return a number")))
    }

    /// Mean over all values.
    pub fn mean(&self) -> Result<f64> {
        self.reduce("mean")
    }

    /// Minimum over all values.
    pub fn min(&self) -> Result<f64> {
        self.reduce("min")
    }

    /// Maximum over all values.
    pub fn max(&self) -> Result<f64> {
        self.reduce("max")
    }

    /// Sum over all values.
    pub fn sum(&self) -> Result<f64> {
        self.reduce("sum")
    }

    /// Force evaluation and return this frame's scalar result.
    pub fn scalar(&self) -> Result<Scalar> {
        Ok(self.session.value_of(&self.node)?)
    }

    /// Force evaluation and return the remote handle with its shape.
    pub fn materialize(&self) -> Result<(String, u64, u64)> {
        Ok(self.session.handle_of(&self.node)?)
    }

    /// Drop cached metadata so the next demand refetches it. The remote
    /// identity is kept.
    pub fn invalidate(&self) {
        debug!("invalidating frame metadata");
        self.node.flush_cache();
    }

    /// Free the remote object now and reset the cache. Unlike drop-time
    /// cleanup this also frees by-name references, and failures propagate.
    pub fn release(&self) -> Result<()> {
        Ok(self.session.release(&self.node)?)
    }
}

impl ops::Add<&Frame> for &Frame {
    type Output = Frame;
    fn add(self, rhs: &Frame) -> Frame {
        self.binop("+", rhs)
    }
}

impl ops::Sub<&Frame> for &Frame {
    type Output = Frame;
    fn sub(self, rhs: &Frame) -> Frame {
        self.binop("-", rhs)
    }
}

impl ops::Mul<&Frame> for &Frame {
    type Output = Frame;
    fn mul(self, rhs: &Frame) -> Frame {
        self.binop("*", rhs)
    }
}

impl ops::Div<&Frame> for &Frame {
    type Output = Frame;
    fn div(self, rhs: &Frame) -> Frame {
        self.binop("/", rhs)
    }
}

impl ops::Add<f64> for &Frame {
    type Output = Frame;
    fn add(self, rhs: f64) -> Frame {
        self.binop("+", rhs)
    }
}

impl ops::Sub<f64> for &Frame {
    type Output = Frame;
    fn sub(self, rhs: f64) -> Frame {
        self.binop("-", rhs)
    }
}

impl ops::Mul<f64> for &Frame {
    type Output = Frame;
    fn mul(self, rhs: f64) -> Frame {
        self.binop("*", rhs)
    }
}

impl ops::Div<f64> for &Frame {
    type Output = Frame;
    fn div(self, rhs: f64) -> Frame {
        self.binop("/", rhs)
    }
}

impl ops::Add<&Frame> for f64 {
    type Output = Frame;
    fn add(self, rhs: &Frame) -> Frame {
        rhs.rbinop("+", self)
    }
}

impl ops::Sub<&Frame> for f64 {
    type Output = Frame;
    fn sub(self, rhs: &Frame) -> Frame {
        rhs.rbinop("-", self)
    }
}

impl ops::Mul<&Frame> for f64 {
    type Output = Frame;
    fn mul(self, rhs: &Frame) -> Frame {
        rhs.rbinop("*", self)
    }
}

impl ops::Div<&Frame> for f64 {
    type Output = Frame;
    fn div(self, rhs: &Frame) -> Frame {
        rhs.rbinop("/", self)
    }
}
