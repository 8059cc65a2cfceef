//! File-backed singleton device state.
//!
//! Shared by the supervisor and the mission process. There is no lock:
//! every write is an atomic replace and every read tolerates a missing
//! or malformed file by falling back to the default IDLE record.

use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::Result;
use crate::persist::write_atomic;
use crate::types::{epoch_seconds, DeviceState, Transition};

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current record. Never fails.
    pub fn read(&self) -> DeviceState {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(_) => return DeviceState::default(),
        };

        match serde_json::from_slice(&raw) {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Device state file is corrupt, treating as IDLE"
                );
                DeviceState::default()
            }
        }
    }

    pub fn write(&self, state: &DeviceState) -> Result<()> {
        let contents = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.path, &contents)?;
        Ok(())
    }

    /// Read, apply `transition`, write back. Returns the written record.
    pub fn transition(&self, transition: Transition) -> Result<DeviceState> {
        let next = transition.apply(self.read(), epoch_seconds());
        self.write(&next)?;
        Ok(next)
    }
}
