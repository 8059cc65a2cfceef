//! Core error types

use thiserror::Error;

/// Core error type for envmon
#[derive(Debug, Error)]
pub enum CoreError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parsed but failed validation
    #[error("Invalid configuration: {0}")]
    ConfigValidation(String),

    /// Mission identifier does not name a mission directory
    #[error("Mission not found: {mission_id}")]
    MissionNotFound { mission_id: String },
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
