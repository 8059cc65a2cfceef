//! Single-slot PID file for the supervised mission process.
//!
//! [`ProcessRegistry::running_pid`] is the single source of truth for
//! "is a mission currently executing". A stale PID (gone, a zombie, or a
//! live process that is not our mission) is cleared on sight, but only if
//! the file still names it.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use envmon_core::persist::write_atomic;

use crate::liveness::{Liveness, ProcessProbe};

#[derive(Clone)]
pub struct ProcessRegistry {
    path: PathBuf,
    probe: Arc<dyn ProcessProbe>,
}

impl std::fmt::Debug for ProcessRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRegistry")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ProcessRegistry {
    pub fn new(path: impl Into<PathBuf>, probe: Arc<dyn ProcessProbe>) -> Self {
        Self {
            path: path.into(),
            probe,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn probe(&self) -> &Arc<dyn ProcessProbe> {
        &self.probe
    }

    /// Persist `pid`, replacing any prior value.
    pub fn write(&self, pid: u32) -> std::io::Result<()> {
        write_atomic(&self.path, pid.to_string().as_bytes())
    }

    /// Stored PID, if any. A malformed file is deleted unless it was
    /// rewritten in the meantime.
    pub fn read(&self) -> Option<u32> {
        let raw = self.read_raw()?;
        match parse_pid(&raw) {
            Some(pid) => Some(pid),
            None => {
                if self.remove_if_unchanged(&raw) {
                    warn!(path = %self.path.display(), contents = %raw.trim(), "Corrupt PID file removed");
                }
                None
            }
        }
    }

    /// Delete the PID file. Idempotent.
    pub fn clear(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove PID file");
            }
        }
    }

    /// Clear only if the file still names `pid`. Returns whether it did.
    pub fn clear_if(&self, pid: u32) -> bool {
        match self.read_raw() {
            Some(raw) if parse_pid(&raw) == Some(pid) => self.remove_if_unchanged(&raw),
            _ => false,
        }
    }

    /// PID of the verified running mission. Never touches the file, so it
    /// is safe to call without holding the launch lock.
    pub fn verified_pid(&self) -> Option<u32> {
        self.read_raw()
            .and_then(|raw| parse_pid(&raw))
            .filter(|&pid| self.probe.is_our_mission(pid))
    }

    /// PID of the verified running mission, healing the registry when the
    /// stored PID is stale. A PID registered while the check ran survives.
    pub fn running_pid(&self) -> Option<u32> {
        let pid = self.read()?;

        match self.probe.probe(pid) {
            Liveness::Alive if self.probe.identity_matches(pid) => Some(pid),
            Liveness::Alive => {
                if self.clear_if(pid) {
                    warn!(pid, "PID file named a live process that is not a mission; cleared");
                }
                None
            }
            state @ (Liveness::Absent | Liveness::Zombie) => {
                if state == Liveness::Zombie {
                    self.probe.reap(pid);
                }
                if self.clear_if(pid) {
                    warn!(pid, ?state, "PID file named a dead process; cleared");
                }
                None
            }
        }
    }

    /// `(running, pid)` pair as exposed on the API.
    pub fn is_running(&self) -> (bool, Option<u32>) {
        let pid = self.running_pid();
        (pid.is_some(), pid)
    }

    fn read_raw(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Some(raw),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "PID file unreadable");
                None
            }
        }
    }

    /// Remove the file only if it still holds `expected`.
    fn remove_if_unchanged(&self, expected: &str) -> bool {
        if self.read_raw().as_deref() != Some(expected) {
            return false;
        }
        self.clear();
        true
    }
}

fn parse_pid(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|&pid| pid > 0)
}
