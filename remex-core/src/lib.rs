//! Lazy remote-expression evaluation engine
//!
//! This crate is the client-side core of remex: it builds an in-memory DAG
//! of pending computations against a stateful remote compute service,
//! serializes that DAG into the service's textual expression language,
//! decides which shared subexpressions must be pinned as named remote
//! temporaries, and reclaims remote objects once no client-side structure
//! references them. The remote service itself is consumed through the
//! [`service::ExecutionService`] trait and never implemented here.

#![warn(missing_docs)]

pub mod cache;
pub mod error;
pub mod literal;
pub mod node;
pub mod reclaim;
pub mod serialize;
pub mod service;
pub mod session;

// Re-export key types for convenience
pub use cache::{ColumnType, MetaCache, Scalar};
pub use error::{Error, Result};
pub use literal::Literal;
pub use node::{Child, Node, SHARED_PARENT_THRESHOLD};
pub use serialize::{ExprPass, NameSource, PinAssignment};
pub use service::{EvalOutcome, ExecutionService, RemoteSchema};
pub use session::{Session, SAMPLE_ROWS};
