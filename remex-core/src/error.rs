//! Error types for the expression engine

use thiserror::Error;

/// Result type for expression engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for expression engine operations
#[derive(Error, Debug)]
pub enum Error {
    /// A column-function construct is outside the supported whitelist.
    /// Always a caller bug, never worth retrying.
    #[error("Unsupported construct in column function: {0}")]
    Translation(String),

    /// A literal that cannot be expressed in the wire grammar reached the
    /// serializer. Caller bug.
    #[error("Cannot serialize literal: {0}")]
    Serialization(String),

    /// The execution service returned a structured error for a well-formed
    /// expression. The message is the service's own, surfaced verbatim.
    #[error("Remote evaluation failed: {0}")]
    RemoteEvaluation(String),

    /// Transport-level failure before any response was received. The only
    /// class a caller might reasonably retry, at the transport layer.
    #[error("Connection to execution service failed: {0}")]
    RemoteConnection(String),

    /// Local misuse of a result, e.g. asking for the scalar value of an
    /// expression that produced a frame.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}
