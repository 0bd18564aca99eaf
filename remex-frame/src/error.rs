//! Error types for the frame facade

use thiserror::Error;

/// Error type for frame operations
#[derive(Error, Debug)]
pub enum Error {
    /// Engine error
    #[error("Engine error: {0}")]
    Core(#[from] remex_core::Error),

    /// A referenced column does not exist in the frame
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Local shape mismatch, detected before any remote work
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The remote result had an unexpected form for this operation
    #[error("Unexpected result: {0}")]
    UnexpectedResult(String),
}

/// Result type for frame operations
pub type Result<T> = std::result::Result<T, Error>;
