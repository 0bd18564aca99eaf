//! DAG nodes for pending remote computations
//!
//! A [`Node`] is an immutable vertex in the lazy expression DAG: an operator
//! tag applied to an ordered list of children, where each child is either
//! another node or a raw literal. Composition always builds new nodes; a
//! node's children are never mutated after construction.
//!
//! Sharing is tracked structurally: every time a node is passed as a child
//! to a constructor its parent counter is bumped. A node referenced by more
//! than [`SHARED_PARENT_THRESHOLD`] parents is considered shared and will be
//! pinned under a remote temporary name during serialization, so the shared
//! subexpression is computed once and back-referenced thereafter.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use crate::cache::MetaCache;
use crate::literal::Literal;
use crate::reclaim::Reaper;

/// Maximum number of structural parents a node may have and still be
/// inlined at every use. One parent is the ordinary pass-through reference
/// created by building a single enclosing expression; anything beyond that
/// is real sharing and forces a pin.
pub const SHARED_PARENT_THRESHOLD: usize = 1;

/// A child position of a node: either a sub-expression or a raw literal.
#[derive(Clone)]
pub enum Child {
    /// A nested sub-expression
    Node(Node),

    /// A raw literal argument, serialized directly
    Literal(Literal),
}

impl From<Node> for Child {
    fn from(node: Node) -> Self {
        Child::Node(node)
    }
}

impl From<Literal> for Child {
    fn from(value: Literal) -> Self {
        Child::Literal(value)
    }
}

impl From<i64> for Child {
    fn from(value: i64) -> Self {
        Child::Literal(value.into())
    }
}

impl From<f64> for Child {
    fn from(value: f64) -> Self {
        Child::Literal(value.into())
    }
}

impl From<&str> for Child {
    fn from(value: &str) -> Self {
        Child::Literal(value.into())
    }
}

struct NodeInner {
    /// Operator tag; empty for bare literal wrappers and by-name references
    op: String,

    /// Ordered children, fixed at construction
    children: Vec<Child>,

    /// True iff this node is a derived computation the client caused to be
    /// materialized; false for references to pre-existing remote objects
    owned: bool,

    /// The node's metadata cache; the only shared mutable state
    cache: Mutex<MetaCache>,

    /// Guards remote evaluation so concurrent callers produce one call
    eval_guard: Mutex<()>,

    /// Number of structural positions referencing this node
    parents: AtomicUsize,

    /// Armed once the node owns a materialized remote object
    reaper: OnceLock<Reaper>,
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        if !self.owned {
            // A "get by name" reference: the user created the remote
            // object and may still address it outside this client.
            return;
        }
        if let Ok(cache) = self.cache.get_mut() {
            if let (Some(id), Some(reaper)) = (cache.remote_id(), self.reaper.get()) {
                reaper.free_silent(id);
            }
        }
    }
}

/// An immutable vertex in the lazy expression DAG. Cheap to clone; clones
/// share the same underlying node and cache.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    /// Build an operator node over the given children. Construction never
    /// blocks and performs no I/O; node children get their parent counters
    /// bumped here.
    pub fn call(op: impl Into<String>, children: Vec<Child>) -> Node {
        let op = op.into();
        debug_assert!(!op.is_empty(), "operator nodes need a non-empty tag");
        for child in &children {
            if let Child::Node(node) = child {
                node.inner.parents.fetch_add(1, Ordering::Relaxed);
            }
        }
        Node::build(op, children, true, MetaCache::new())
    }

    /// Wrap a bare literal as a node. Literal wrappers are always inlined,
    /// never pinned.
    pub fn literal(value: impl Into<Literal>) -> Node {
        Node::build(
            String::new(),
            vec![Child::Literal(value.into())],
            true,
            MetaCache::new(),
        )
    }

    /// Reference a pre-existing, user-named remote object. The node starts
    /// handle-valued and is never auto-freed on drop.
    pub fn by_name(name: &str) -> Node {
        Node::build(String::new(), Vec::new(), false, MetaCache::for_remote(name))
    }

    fn build(op: String, children: Vec<Child>, owned: bool, cache: MetaCache) -> Node {
        Node {
            inner: Arc::new(NodeInner {
                op,
                children,
                owned,
                cache: Mutex::new(cache),
                eval_guard: Mutex::new(()),
                parents: AtomicUsize::new(0),
                reaper: OnceLock::new(),
            }),
        }
    }

    /// The operator tag; empty for literal wrappers and by-name references.
    pub fn op(&self) -> &str {
        &self.inner.op
    }

    /// The node's children, in construction order.
    pub fn children(&self) -> &[Child] {
        &self.inner.children
    }

    /// True for a bare literal wrapper.
    pub fn is_literal(&self) -> bool {
        self.inner.op.is_empty() && matches!(self.inner.children.first(), Some(Child::Literal(_)))
    }

    /// The wrapped literal, for literal wrapper nodes.
    pub fn as_literal(&self) -> Option<&Literal> {
        if !self.inner.op.is_empty() {
            return None;
        }
        match self.inner.children.first() {
            Some(Child::Literal(lit)) => Some(lit),
            _ => None,
        }
    }

    /// True iff this node is a derived computation (had children at
    /// construction) rather than a by-name reference.
    pub fn owned(&self) -> bool {
        self.inner.owned
    }

    /// Number of structural positions currently referencing this node.
    pub fn parent_count(&self) -> usize {
        self.inner.parents.load(Ordering::Relaxed)
    }

    /// True when this node's result must be pinned rather than re-inlined:
    /// it is an operator node with more live structural references than the
    /// pass-through baseline.
    pub fn is_shared(&self) -> bool {
        !self.inner.op.is_empty() && self.parent_count() > SHARED_PARENT_THRESHOLD
    }

    /// Stable identity of this node for the duration of its lifetime.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// A point-in-time copy of the node's cache.
    pub fn cache_snapshot(&self) -> MetaCache {
        self.cache().clone()
    }

    /// Seed this node's cache with known-valid shape fields copied from a
    /// predecessor's cache. One-time copy at construction, never aliasing.
    pub fn seed_shape_from(&self, prior: &MetaCache) {
        self.cache().seed_shape_from(prior);
    }

    /// Record column names that are valid by construction, without a fetch.
    pub fn seed_names(&self, names: Vec<String>) {
        self.cache().set_names(names);
    }

    /// Invalidate cached metadata except the remote identity.
    pub fn flush_cache(&self) {
        self.cache().flush();
    }

    pub(crate) fn cache(&self) -> MutexGuard<'_, MetaCache> {
        self.inner
            .cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn eval_guard(&self) -> MutexGuard<'_, ()> {
        self.inner
            .eval_guard
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn arm_reaper(&self, reaper: Reaper) {
        let _ = self.inner.reaper.set(reaper);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cache = self.cache();
        f.debug_struct("Node")
            .field("op", &self.inner.op)
            .field("children", &self.inner.children.len())
            .field("owned", &self.inner.owned)
            .field("parents", &self.parent_count())
            .field("remote_id", &cache.remote_id())
            .field("scalar", &cache.scalar())
            .finish()
    }
}
