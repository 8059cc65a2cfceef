//! Supervisor error types.
//!
//! Only request-level contract violations are errors. Stale registries and
//! corrupt state files are healed where they are found and never reach
//! the caller.

use envmon_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Start requested while a verified mission process is alive
    #[error("Mission already running (pid={pid})")]
    AlreadyRunning { pid: u32 },

    /// Stop/abort requested with nothing running
    #[error("No running mission")]
    NotRunning,

    /// Spawning the mission process failed
    #[error("Failed to launch mission process: {0}")]
    LaunchFailure(#[source] std::io::Error),

    /// Signal delivery failed for a process believed to be alive
    #[error("Failed to signal mission process {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    /// Another request or process held the launch lock for too long
    #[error("Timed out acquiring launch lock {path}")]
    LockTimeout { path: String },

    #[error("Mission not found: {mission_id}")]
    MissionNotFound { mission_id: String },

    #[error("Core error: {0}")]
    Core(CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CoreError> for SupervisorError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::MissionNotFound { mission_id } => {
                SupervisorError::MissionNotFound { mission_id }
            }
            other => SupervisorError::Core(other),
        }
    }
}

/// Result type alias for supervisor operations
pub type Result<T> = std::result::Result<T, SupervisorError>;
