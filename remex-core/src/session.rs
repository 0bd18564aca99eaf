//! Session bookkeeping and the evaluation driver
//!
//! A [`Session`] pairs the expression DAG with one execution service: it
//! hands out collision-free remote temporary names, drives evaluation when
//! a concrete value is demanded, and commits results into node caches.
//! Everything here is synchronous; the only blocking points are the remote
//! calls themselves.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::cache::{ColumnType, Scalar};
use crate::error::{Error, Result};
use crate::node::{Child, Node};
use crate::reclaim::Reaper;
use crate::serialize::{ExprPass, NameSource};
use crate::service::{EvalOutcome, ExecutionService};

/// Number of preview rows requested with the first schema fetch.
pub const SAMPLE_ROWS: usize = 10;

/// A client session against one execution service.
pub struct Session {
    service: Arc<dyn ExecutionService>,
    session_id: String,
    counter: AtomicU64,
}

impl Session {
    /// Open a session with a random session id.
    pub fn new(service: Arc<dyn ExecutionService>) -> Self {
        let mut session_id = Uuid::new_v4().simple().to_string();
        session_id.truncate(8);
        Self::with_session_id(service, &session_id)
    }

    /// Open a session with a caller-chosen session id. Temporary names are
    /// only collision-free if the id is unique among concurrent sessions.
    pub fn with_session_id(service: Arc<dyn ExecutionService>, session_id: &str) -> Self {
        Self {
            service,
            session_id: session_id.to_string(),
            counter: AtomicU64::new(0),
        }
    }

    /// This session's id, embedded in every generated temporary name.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Build a new operator node. Pure composition: no remote work.
    pub fn make_node(&self, op: &str, args: Vec<Child>) -> Node {
        Node::call(op, args)
    }

    /// Make `node`'s result available in its cache, issuing at most one
    /// remote evaluation. Returns immediately when the cache already holds
    /// a scalar or a handle.
    ///
    /// On a service or transport error no cache anywhere in the DAG is
    /// modified; pin assignments made during serialization are discarded.
    pub fn force_value(&self, node: &Node) -> Result<()> {
        let _guard = node.eval_guard();
        if !node.cache().is_empty() {
            return Ok(());
        }

        let mut pass = ExprPass::new(self);
        let expr = pass.serialize(node)?;
        debug!(%expr, "submitting expression");
        let outcome = self.service.evaluate(&expr)?;

        // Success: commit the pins assigned during the pass, then the
        // top-level result. The response itself covers the top-level node,
        // even when it was pinned as shared.
        //
        // A pinned node may have been materialized directly by another
        // thread while our evaluate was in flight; its cache already holds
        // a result that other callers may be using. Commit only into a
        // still-empty cache, and free the now-redundant `tmp=` object.
        for pin in pass.into_pins() {
            if pin.node.id() == node.id() {
                continue;
            }
            let committed = {
                let mut cache = pin.node.cache();
                if cache.is_empty() {
                    cache.set_remote_id(pin.name.clone());
                    true
                } else {
                    false
                }
            };
            if committed {
                if pin.node.owned() {
                    pin.node.arm_reaper(Reaper::new(self.service.clone()));
                }
            } else {
                debug!(name = %pin.name, "pinned node was materialized concurrently");
                Reaper::new(self.service.clone()).free_silent(&pin.name);
            }
        }
        match outcome {
            EvalOutcome::Scalar(value) => node.cache().set_scalar(value),
            EvalOutcome::Handle { id, nrows, ncols } => {
                node.cache().set_handle(id, nrows, ncols);
                if node.owned() {
                    node.arm_reaper(Reaper::new(self.service.clone()));
                }
            }
        }
        Ok(())
    }

    /// Ensure row/column counts, column names and types (and the preview
    /// sample) are cached, materializing the node first if necessary.
    pub fn force_shape(&self, node: &Node) -> Result<()> {
        {
            let cache = node.cache();
            if cache.nrows().is_some()
                && cache.ncols().is_some()
                && cache.names().is_some()
                && cache.types().is_some()
            {
                return Ok(());
            }
            if cache.is_scalar() {
                return Err(Error::InvalidOperation(
                    "scalar expression has no schema".into(),
                ));
            }
        }

        if node.cache().remote_id().is_none() {
            self.force_value(node)?;
        }
        let handle = match node.cache().remote_id() {
            Some(id) => id.to_string(),
            None => {
                return Err(Error::InvalidOperation(
                    "expression evaluated to a scalar, not a frame".into(),
                ))
            }
        };

        let schema = self.service.fetch_schema(&handle, SAMPLE_ROWS)?;
        debug!(%handle, nrows = schema.nrows, ncols = schema.ncols, "fetched schema");
        node.cache().set_schema(schema);
        Ok(())
    }

    /// Force evaluation and return the scalar result. Fails with
    /// [`Error::InvalidOperation`] if the expression produced a frame.
    pub fn value_of(&self, node: &Node) -> Result<Scalar> {
        self.force_value(node)?;
        let cache = node.cache();
        cache.scalar().cloned().ok_or_else(|| {
            Error::InvalidOperation("expression produced a frame, not a scalar".into())
        })
    }

    /// Force evaluation and return the remote handle with its shape,
    /// fetching shape metadata for by-name references if needed.
    pub fn handle_of(&self, node: &Node) -> Result<(String, u64, u64)> {
        self.force_value(node)?;
        {
            let cache = node.cache();
            if cache.is_scalar() {
                return Err(Error::InvalidOperation(
                    "expression produced a scalar, not a frame".into(),
                ));
            }
            if let (Some(id), Some(nrows), Some(ncols)) =
                (cache.remote_id(), cache.nrows(), cache.ncols())
            {
                return Ok((id.to_string(), nrows, ncols));
            }
        }

        // A by-name reference has identity but no shape yet.
        self.force_shape(node)?;
        let cache = node.cache();
        match (cache.remote_id(), cache.nrows(), cache.ncols()) {
            (Some(id), Some(nrows), Some(ncols)) => Ok((id.to_string(), nrows, ncols)),
            _ => Err(Error::InvalidOperation(
                "expression did not produce a frame".into(),
            )),
        }
    }

    /// Force a shape fetch and return column names and types.
    pub fn schema_of(&self, node: &Node) -> Result<(Vec<String>, HashMap<String, ColumnType>)> {
        self.force_shape(node)?;
        let cache = node.cache();
        match (cache.names(), cache.types()) {
            (Some(names), Some(types)) => Ok((names.to_vec(), types.clone())),
            _ => Err(Error::InvalidOperation("schema unavailable".into())),
        }
    }

    /// Explicit early reclamation: free the node's remote object now and
    /// reset its cache. Unlike drop-time cleanup this applies to by-name
    /// references too (an explicit user action), and failures propagate.
    pub fn release(&self, node: &Node) -> Result<()> {
        let mut cache = node.cache();
        if let Some(id) = cache.remote_id().map(str::to_string) {
            self.service.free(&id)?;
            cache.clear();
        }
        Ok(())
    }
}

impl NameSource for Session {
    fn fresh_name(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("rx_{}_{}", n, self.session_id)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("names_issued", &self.counter.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{MockExecutionService, RemoteSchema};
    use mockall::predicate::eq;
    use std::sync::Mutex;
    use std::time::Duration;

    fn schema_for(names: &[&str]) -> RemoteSchema {
        RemoteSchema {
            nrows: 100,
            ncols: names.len() as u64,
            names: names.iter().map(|s| s.to_string()).collect(),
            types: names
                .iter()
                .map(|s| (s.to_string(), ColumnType::Numeric))
                .collect(),
            sample: vec![vec![1.0.into()]],
        }
    }

    #[test]
    fn scalar_evaluation_is_idempotent() {
        let mut service = MockExecutionService::new();
        service
            .expect_evaluate()
            .with(eq("(+ 3 4)"))
            .times(1)
            .returning(|_| Ok(EvalOutcome::Scalar(Scalar::Num(7.0))));
        let session = Session::new(Arc::new(service));

        let n1 = Node::literal(3i64);
        let n2 = Node::literal(4i64);
        let n3 = session.make_node("+", vec![n1.into(), n2.into()]);

        assert_eq!(session.value_of(&n3).unwrap(), Scalar::Num(7.0));
        // Second demand is served from the cache; times(1) above would
        // trip on any further remote call.
        assert_eq!(session.value_of(&n3).unwrap(), Scalar::Num(7.0));
    }

    #[test]
    fn sharing_forces_a_single_pin() {
        let mut service = MockExecutionService::new();
        service
            .expect_evaluate()
            .with(eq("(h (f (tmp= rx_1_s (op 1))) (g rx_1_s))"))
            .times(1)
            .returning(|_| Ok(EvalOutcome::Scalar(Scalar::Num(0.0))));
        service.expect_free().returning(|_| Ok(()));
        let session = Session::with_session_id(Arc::new(service), "s");

        let n1 = session.make_node("op", vec![Node::literal(1i64).into()]);
        let n2 = session.make_node("f", vec![n1.clone().into()]);
        let n3 = session.make_node("g", vec![n1.clone().into()]);
        let n4 = session.make_node("h", vec![n2.into(), n3.into()]);

        session.value_of(&n4).unwrap();
        // The pin was committed: the shared node now back-references its
        // remote temporary.
        assert_eq!(n1.cache_snapshot().remote_id(), Some("rx_1_s"));
    }

    #[test]
    fn handle_result_is_cached() {
        let mut service = MockExecutionService::new();
        service.expect_evaluate().times(1).returning(|_| {
            Ok(EvalOutcome::Handle {
                id: "rx_1_s".into(),
                nrows: 50,
                ncols: 3,
            })
        });
        service.expect_free().returning(|_| Ok(()));
        let session = Session::with_session_id(Arc::new(service), "s");

        let node = session.make_node("cols", vec![Node::by_name("users").into(), 0i64.into()]);
        assert_eq!(
            session.handle_of(&node).unwrap(),
            ("rx_1_s".to_string(), 50, 3)
        );
        assert_eq!(
            session.handle_of(&node).unwrap(),
            ("rx_1_s".to_string(), 50, 3)
        );
    }

    #[test]
    fn value_of_a_frame_is_an_invalid_operation() {
        let mut service = MockExecutionService::new();
        service.expect_evaluate().returning(|_| {
            Ok(EvalOutcome::Handle {
                id: "rx_1_s".into(),
                nrows: 50,
                ncols: 3,
            })
        });
        service.expect_free().returning(|_| Ok(()));
        let session = Session::with_session_id(Arc::new(service), "s");

        let node = session.make_node("cols", vec![Node::by_name("users").into(), 0i64.into()]);
        let err = session.value_of(&node).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn failed_evaluation_leaves_all_caches_untouched() {
        let mut service = MockExecutionService::new();
        service
            .expect_evaluate()
            .times(1)
            .returning(|_| Err(Error::RemoteEvaluation("unknown operator `h`".into())));
        let session = Session::with_session_id(Arc::new(service), "s");

        let shared = session.make_node("op", vec![Node::literal(1i64).into()]);
        let top = session.make_node(
            "h",
            vec![
                session.make_node("f", vec![shared.clone().into()]).into(),
                session.make_node("g", vec![shared.clone().into()]).into(),
            ],
        );

        let before_top = top.cache_snapshot();
        let before_shared = shared.cache_snapshot();
        let err = session.value_of(&top).unwrap_err();
        assert!(matches!(err, Error::RemoteEvaluation(_)));
        assert_eq!(top.cache_snapshot(), before_top);
        assert_eq!(shared.cache_snapshot(), before_shared);
        assert!(top.cache_snapshot().is_empty());
    }

    #[test]
    fn schema_is_fetched_lazily_and_once() {
        let mut service = MockExecutionService::new();
        service.expect_evaluate().times(1).returning(|_| {
            Ok(EvalOutcome::Handle {
                id: "rx_1_s".into(),
                nrows: 100,
                ncols: 2,
            })
        });
        service
            .expect_fetch_schema()
            .with(eq("rx_1_s"), eq(SAMPLE_ROWS))
            .times(1)
            .returning(|_, _| Ok(schema_for(&["a", "b"])));
        service.expect_free().returning(|_| Ok(()));
        let session = Session::with_session_id(Arc::new(service), "s");

        let node = session.make_node("cols", vec![Node::by_name("users").into(), 0i64.into()]);
        // Materialization alone does not pull the schema.
        session.handle_of(&node).unwrap();
        assert_eq!(node.cache_snapshot().names(), None);

        let (names, types) = session.schema_of(&node).unwrap();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(types["a"], ColumnType::Numeric);
        // Cached now.
        session.schema_of(&node).unwrap();
    }

    #[test]
    fn by_name_reference_needs_no_evaluation() {
        let mut service = MockExecutionService::new();
        service
            .expect_fetch_schema()
            .with(eq("users"), eq(SAMPLE_ROWS))
            .times(1)
            .returning(|_, _| Ok(schema_for(&["a", "b"])));
        let session = Session::with_session_id(Arc::new(service), "s");

        let node = Node::by_name("users");
        let (handle, nrows, ncols) = session.handle_of(&node).unwrap();
        assert_eq!(handle, "users");
        assert_eq!((nrows, ncols), (100, 2));
    }

    #[test]
    fn release_frees_and_resets() {
        let mut service = MockExecutionService::new();
        service.expect_evaluate().times(1).returning(|_| {
            Ok(EvalOutcome::Handle {
                id: "rx_1_s".into(),
                nrows: 10,
                ncols: 1,
            })
        });
        service
            .expect_free()
            .with(eq("rx_1_s"))
            .times(1)
            .returning(|_| Ok(()));
        let session = Session::with_session_id(Arc::new(service), "s");

        let node = session.make_node("cols", vec![Node::by_name("users").into(), 0i64.into()]);
        session.handle_of(&node).unwrap();
        session.release(&node).unwrap();
        assert!(node.cache_snapshot().is_empty());
        // Dropping the node later must not free again; times(1) above
        // enforces that.
        drop(node);
    }

    /// Scripted fake for drop-order and threading tests, where mock
    /// expectation lifetimes get in the way.
    struct RecordingService {
        exprs: Mutex<Vec<String>>,
        freed: Mutex<Vec<String>>,
        eval_delay: Duration,
        outcome: Box<dyn Fn(u64) -> EvalOutcome + Send + Sync>,
        evals: AtomicU64,
    }

    impl RecordingService {
        fn frames() -> Self {
            Self::with_outcome(Duration::ZERO, |n| EvalOutcome::Handle {
                id: format!("rx_auto_{n}"),
                nrows: 10,
                ncols: 1,
            })
        }

        fn with_outcome(
            eval_delay: Duration,
            outcome: impl Fn(u64) -> EvalOutcome + Send + Sync + 'static,
        ) -> Self {
            Self {
                exprs: Mutex::new(Vec::new()),
                freed: Mutex::new(Vec::new()),
                eval_delay,
                outcome: Box::new(outcome),
                evals: AtomicU64::new(0),
            }
        }

        fn freed(&self) -> Vec<String> {
            self.freed.lock().unwrap().clone()
        }
    }

    impl ExecutionService for RecordingService {
        fn evaluate(&self, expr: &str) -> Result<EvalOutcome> {
            if !self.eval_delay.is_zero() {
                std::thread::sleep(self.eval_delay);
            }
            self.exprs.lock().unwrap().push(expr.to_string());
            let n = self.evals.fetch_add(1, Ordering::SeqCst) + 1;
            Ok((self.outcome)(n))
        }

        fn fetch_schema(&self, _handle: &str, _sample_rows: usize) -> Result<RemoteSchema> {
            Ok(schema_for(&["a"]))
        }

        fn free(&self, handle: &str) -> Result<()> {
            self.freed.lock().unwrap().push(handle.to_string());
            Ok(())
        }
    }

    #[test]
    fn dropping_a_derived_node_frees_its_remote_object() {
        let service = Arc::new(RecordingService::frames());
        let session = Session::with_session_id(service.clone(), "s");

        let node = session.make_node("cols", vec![Node::by_name("users").into(), 0i64.into()]);
        session.handle_of(&node).unwrap();
        assert!(service.freed().is_empty());

        drop(node);
        assert_eq!(service.freed(), ["rx_auto_1"]);
    }

    #[test]
    fn dropping_a_by_name_reference_never_frees() {
        let service = Arc::new(RecordingService::frames());
        let session = Session::with_session_id(service.clone(), "s");

        let node = Node::by_name("users");
        session.handle_of(&node).unwrap();
        drop(node);
        drop(session);
        assert!(service.freed().is_empty());
    }

    #[test]
    fn unmaterialized_nodes_are_dropped_without_remote_calls() {
        let service = Arc::new(RecordingService::frames());
        let session = Session::with_session_id(service.clone(), "s");

        let node = session.make_node("cols", vec![Node::by_name("users").into(), 0i64.into()]);
        drop(node);
        assert!(service.freed().is_empty());
        assert!(service.exprs.lock().unwrap().is_empty());
    }

    #[test]
    fn pinned_temporaries_are_freed_when_dropped() {
        let service = Arc::new(RecordingService::frames());
        let session = Session::with_session_id(service.clone(), "s");

        let shared = session.make_node("op", vec![Node::literal(1i64).into()]);
        let top = session.make_node(
            "h",
            vec![
                session.make_node("f", vec![shared.clone().into()]).into(),
                session.make_node("g", vec![shared.clone().into()]).into(),
            ],
        );
        session.handle_of(&top).unwrap();
        assert_eq!(shared.cache_snapshot().remote_id(), Some("rx_1_s"));

        drop(top);
        drop(shared);
        let freed = service.freed();
        assert!(freed.contains(&"rx_1_s".to_string()));
        assert!(freed.contains(&"rx_auto_1".to_string()));
    }

    /// Service that holds a parent expression's evaluation open until the
    /// shared subexpression has been materialized directly.
    struct HoldingService {
        parent_entered: AtomicU64,
        shared_done: AtomicU64,
        freed: Mutex<Vec<String>>,
    }

    impl HoldingService {
        fn new() -> Self {
            Self {
                parent_entered: AtomicU64::new(0),
                shared_done: AtomicU64::new(0),
                freed: Mutex::new(Vec::new()),
            }
        }

        fn wait_for(flag: &AtomicU64) {
            while flag.load(Ordering::SeqCst) == 0 {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }

    impl ExecutionService for HoldingService {
        fn evaluate(&self, expr: &str) -> Result<EvalOutcome> {
            if expr.starts_with("(h ") {
                self.parent_entered.store(1, Ordering::SeqCst);
                Self::wait_for(&self.shared_done);
                return Ok(EvalOutcome::Handle {
                    id: "top_handle".into(),
                    nrows: 10,
                    ncols: 1,
                });
            }
            let outcome = EvalOutcome::Handle {
                id: "b_handle".into(),
                nrows: 10,
                ncols: 1,
            };
            self.shared_done.store(1, Ordering::SeqCst);
            Ok(outcome)
        }

        fn fetch_schema(&self, _handle: &str, _sample_rows: usize) -> Result<RemoteSchema> {
            Ok(schema_for(&["a"]))
        }

        fn free(&self, handle: &str) -> Result<()> {
            self.freed.lock().unwrap().push(handle.to_string());
            Ok(())
        }
    }

    #[test]
    fn pin_commit_skips_a_concurrently_materialized_node() {
        let service = Arc::new(HoldingService::new());
        let session = Arc::new(Session::with_session_id(service.clone(), "s"));

        let shared = session.make_node("op", vec![Node::literal(1i64).into()]);
        let top = session.make_node(
            "h",
            vec![
                session.make_node("f", vec![shared.clone().into()]).into(),
                session.make_node("g", vec![shared.clone().into()]).into(),
            ],
        );

        // The parent serializes a (tmp= rx_1_s (op 1)) pin, then blocks in
        // evaluate until the shared node is materialized directly.
        let parent = {
            let session = session.clone();
            let top = top.clone();
            std::thread::spawn(move || session.handle_of(&top).unwrap())
        };
        HoldingService::wait_for(&service.parent_entered);
        session.handle_of(&shared).unwrap();
        parent.join().unwrap();

        // The direct result stands; the redundant temporary is freed
        // instead of clobbering it.
        assert_eq!(shared.cache_snapshot().remote_id(), Some("b_handle"));
        assert_eq!(service.freed.lock().unwrap().as_slice(), ["rx_1_s"]);

        drop(top);
        drop(shared);
        let freed = service.freed.lock().unwrap().clone();
        assert!(freed.contains(&"b_handle".to_string()));
        assert!(freed.contains(&"top_handle".to_string()));
    }

    #[test]
    fn concurrent_demands_issue_one_remote_call() {
        let service = Arc::new(RecordingService::with_outcome(
            Duration::from_millis(30),
            |_| EvalOutcome::Scalar(Scalar::Num(7.0)),
        ));
        let session = Arc::new(Session::with_session_id(service.clone(), "s"));

        let node = session.make_node(
            "+",
            vec![Node::literal(3i64).into(), Node::literal(4i64).into()],
        );

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let session = session.clone();
                let node = node.clone();
                std::thread::spawn(move || session.value_of(&node).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Scalar::Num(7.0));
        }
        assert_eq!(service.evals.load(Ordering::SeqCst), 1);
    }
}
