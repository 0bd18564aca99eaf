//! Reclamation of remote temporaries
//!
//! When the last client-side reference to an owned, materialized node goes
//! away, the remote object backing it must be deleted; a node that merely
//! references a pre-existing, user-named object must never be auto-deleted.
//! Drop-time cleanup is best-effort: a failed delete is logged and treated
//! as leaked-but-harmless, never propagated to the caller.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::service::ExecutionService;

/// Frees a node's remote object when the node is dropped.
///
/// Armed on a node at the moment an owned materialization commits, so a
/// node that was never materialized carries no service reference at all.
#[derive(Clone)]
pub struct Reaper {
    service: Arc<dyn ExecutionService>,
}

impl Reaper {
    /// Create a reaper bound to the service that owns the remote object.
    pub fn new(service: Arc<dyn ExecutionService>) -> Self {
        Self { service }
    }

    /// Delete a remote object, swallowing any failure.
    pub fn free_silent(&self, handle: &str) {
        match self.service.free(handle) {
            Ok(()) => debug!(handle, "freed remote temporary"),
            Err(err) => warn!(handle, error = %err, "failed to free remote temporary; leaking"),
        }
    }
}

impl fmt::Debug for Reaper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaper").finish_non_exhaustive()
    }
}
