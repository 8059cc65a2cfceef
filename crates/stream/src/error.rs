//! Error types for stream operations.
//!
//! Nothing here reaches an observer: the broadcaster logs these at debug
//! level and retries on the next tick.

use thiserror::Error;

/// Errors that can occur while reading mission files for the stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;
