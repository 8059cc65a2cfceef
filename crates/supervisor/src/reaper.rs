//! Per-mission reaper.
//!
//! Waits for the mission process to terminate for any reason, reaps it,
//! and repairs the persisted records if the process died without
//! returning the device to IDLE. The mission process resets state on a
//! clean shutdown, so a record still pointing at a dead PID is a crash.

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use envmon_core::{epoch_seconds, MissionEvent, MissionStore, StateStore, StopReason, Transition};

use crate::guard::LaunchLock;
use crate::liveness::{Liveness, ProcessProbe};
use crate::registry::ProcessRegistry;

/// Warning recorded when the reaper has to reset the device state.
pub const REAPER_WARNING: &str = "Mission process ended (reaper cleanup).";

/// What the reaper found once the process was gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapOutcome {
    /// The process had already returned the device to a terminal state
    CleanExit,
    /// The device state still named this PID as active and was reset
    Recovered,
}

#[derive(Debug, Clone)]
pub struct Reaper {
    pid: u32,
    mission_id: Option<String>,
    registry: ProcessRegistry,
    state: StateStore,
    missions: MissionStore,
    lock: LaunchLock,
}

impl Reaper {
    pub fn new(
        pid: u32,
        mission_id: Option<String>,
        registry: ProcessRegistry,
        state: StateStore,
        missions: MissionStore,
        lock: LaunchLock,
    ) -> Self {
        Self {
            pid,
            mission_id,
            registry,
            state,
            missions,
            lock,
        }
    }

    /// Watch a child this process spawned. `wait` performs the OS reap.
    pub fn watch_child(self, mut child: Child) -> JoinHandle<ReapOutcome> {
        tokio::spawn(async move {
            let status = match child.wait().await {
                Ok(status) => Some(status),
                Err(e) => {
                    // Someone else already collected the exit status
                    warn!(pid = self.pid, error = %e, "Wait on mission process failed");
                    None
                }
            };
            self.finish(status).await
        })
    }

    /// Watch a PID this process did not spawn (adopted after a supervisor
    /// restart) by polling the process table.
    pub fn watch_pid(
        self,
        probe: Arc<dyn ProcessProbe>,
        interval: Duration,
    ) -> JoinHandle<ReapOutcome> {
        tokio::spawn(async move {
            loop {
                match probe.probe(self.pid) {
                    Liveness::Alive => tokio::time::sleep(interval).await,
                    Liveness::Zombie => {
                        probe.reap(self.pid);
                        break;
                    }
                    Liveness::Absent => break,
                }
            }
            self.finish(None).await
        })
    }

    async fn finish(self, status: Option<ExitStatus>) -> ReapOutcome {
        let (code, signal) = status
            .map(|s| (s.code(), s.signal()))
            .unwrap_or((None, None));
        info!(
            pid = self.pid,
            mission_id = self.mission_id.as_deref().unwrap_or("-"),
            ?code,
            ?signal,
            "Mission process terminated"
        );

        // Proceed without the lock rather than leave a dead PID behind.
        let _guard = match self.lock.acquire().await {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!(pid = self.pid, error = %e, "Reaper running without launch lock");
                None
            }
        };

        self.registry.clear_if(self.pid);

        if let Some(mission_id) = self.mission_id.as_deref() {
            self.stamp_unfinished_meta(mission_id);
        }

        let current = self.state.read();
        if current.pid != Some(self.pid) || !current.state.is_active() {
            return ReapOutcome::CleanExit;
        }

        warn!(
            pid = self.pid,
            state = %current.state,
            "Mission process ended without resetting state; forcing IDLE"
        );
        if let Err(e) = self
            .state
            .transition(Transition::idle().warning(REAPER_WARNING))
        {
            error!(pid = self.pid, error = %e, "Failed to reset device state");
        }

        if let Some(mission_id) = current.mission_id.as_deref().or(self.mission_id.as_deref()) {
            let mut event = MissionEvent::warn("Mission process ended unexpectedly.")
                .with("pid", self.pid)
                .with("mission_id", mission_id);
            if let Some(code) = code {
                event = event.with("exit_code", code);
            }
            if let Some(signal) = signal {
                event = event.with("signal", signal);
            }
            if let Err(e) = self.missions.append_event(mission_id, &event) {
                warn!(mission_id, error = %e, "Failed to record crash event");
            }
        }

        ReapOutcome::Recovered
    }

    fn stamp_unfinished_meta(&self, mission_id: &str) {
        let Some(mut meta) = self.missions.read_meta(mission_id) else {
            return;
        };
        if meta.is_finished() {
            return;
        }
        meta.finish(StopReason::Crash, epoch_seconds());
        if let Err(e) = self.missions.write_meta(&meta) {
            warn!(mission_id, error = %e, "Failed to stamp crashed mission meta");
        }
    }
}
