//! Canonical serialization of DAG nodes into expression text
//!
//! One [`ExprPass`] serializes one top-level expression. The walk is
//! depth-first, left-to-right, in construction order, and deterministic:
//! the same DAG shape always produces temporary-name assignments in the
//! same order.
//!
//! Already-materialized subtrees short-circuit to a back-reference: a
//! scalar-valued cache is inlined as its literal text, a handle-valued
//! cache as its remote name. A shared node (see
//! [`Node::is_shared`](crate::node::Node::is_shared)) is wrapped as a
//! `(tmp= name expr)` assignment and later references within the same pass
//! reuse the name. Pin assignments are returned to the caller and are only
//! committed into node caches after the remote evaluation succeeds, so a
//! failed evaluation leaves every cache untouched.

use std::collections::HashMap;

use crate::error::Result;
use crate::node::{Child, Node};

/// Source of fresh, collision-free remote temporary names.
pub trait NameSource {
    /// Produce a name never returned before within this session.
    fn fresh_name(&self) -> String;
}

/// A `(tmp= name expr)` assignment produced during one pass, pending
/// commitment into the node's cache.
pub struct PinAssignment {
    /// The node whose result the name will denote
    pub node: Node,

    /// The assigned remote temporary name
    pub name: String,
}

/// A single serialization pass over one expression DAG.
pub struct ExprPass<'a> {
    names: &'a dyn NameSource,
    assigned: HashMap<usize, String>,
    pins: Vec<PinAssignment>,
}

impl<'a> ExprPass<'a> {
    /// Start a pass drawing temporary names from `names`.
    pub fn new(names: &'a dyn NameSource) -> Self {
        Self {
            names,
            assigned: HashMap::new(),
            pins: Vec::new(),
        }
    }

    /// Serialize `node` into expression text.
    pub fn serialize(&mut self, node: &Node) -> Result<String> {
        let mut out = String::new();
        self.write_node(node, &mut out)?;
        Ok(out)
    }

    /// The pin assignments made during this pass, in assignment order.
    pub fn into_pins(self) -> Vec<PinAssignment> {
        self.pins
    }

    fn write_node(&mut self, node: &Node, out: &mut String) -> Result<()> {
        // Already-evaluated subtrees embody their whole result: inline the
        // scalar, or back-reference the remote object.
        {
            let cache = node.cache();
            if let Some(scalar) = cache.scalar() {
                return scalar.as_literal().write_expr(out);
            }
            if let Some(id) = cache.remote_id() {
                out.push_str(id);
                return Ok(());
            }
        }

        // Pinned earlier in this same pass: reuse the assigned name.
        if let Some(name) = self.assigned.get(&node.id()) {
            out.push_str(name);
            return Ok(());
        }

        if let Some(lit) = node.as_literal() {
            return lit.write_expr(out);
        }

        let pin = if node.is_shared() {
            let name = self.names.fresh_name();
            out.push_str("(tmp= ");
            out.push_str(&name);
            out.push(' ');
            Some(name)
        } else {
            None
        };

        out.push('(');
        out.push_str(node.op());
        for child in node.children() {
            out.push(' ');
            match child {
                Child::Node(child) => self.write_node(child, out)?,
                Child::Literal(lit) => lit.write_expr(out)?,
            }
        }
        out.push(')');

        if let Some(name) = pin {
            out.push(')');
            self.assigned.insert(node.id(), name.clone());
            self.pins.push(PinAssignment {
                node: node.clone(),
                name,
            });
        }
        Ok(())
    }
}
