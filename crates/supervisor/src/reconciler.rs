//! Reconciliation of the persisted device state against the process table.
//!
//! The PID registry is authoritative: an active state with no verified
//! mission process behind it is stale and is corrected back to IDLE.

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use envmon_core::{DeviceState, Transition};

use crate::error::Result;
use crate::reaper::{ReapOutcome, Reaper};
use crate::supervisor::MissionSupervisor;

/// Warning recorded when a status read finds an orphaned active state.
pub const STALE_STATE_WARNING: &str = "Stale state corrected: mission process not running.";

/// Device state with `pid` overlaid from the registry.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    #[serde(flatten)]
    pub device: DeviceState,
    pub running: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissionListing {
    pub missions: Vec<String>,
    /// Missions with no recorded end, excluding the one currently running
    pub incomplete_missions: Vec<String>,
    #[serde(flatten)]
    pub status: StatusSnapshot,
}

impl MissionSupervisor {
    /// Current status, correcting a stale active state on the way.
    pub async fn status(&self) -> Result<StatusSnapshot> {
        let mut running_pid = self.registry.verified_pid();
        let mut device = self.state.read();

        if running_pid.is_none() && device.state.is_active() {
            let _guard = self.lock.acquire().await?;
            // A start may have completed while we waited for the lock. Only
            // the lock holder may heal the registry.
            running_pid = self.registry.running_pid();
            device = self.state.read();
            if running_pid.is_none() && device.state.is_active() {
                warn!(
                    state = %device.state,
                    mission_id = device.mission_id.as_deref().unwrap_or("-"),
                    "Active state with no mission process; correcting to IDLE"
                );
                device = self
                    .state
                    .transition(Transition::idle().warning(STALE_STATE_WARNING))?;
            }
        }

        device.pid = running_pid;
        Ok(StatusSnapshot {
            device,
            running: running_pid.is_some(),
        })
    }

    pub async fn list_missions(&self) -> Result<MissionListing> {
        let status = self.status().await?;
        let missions = self.missions.list()?;
        let active = status
            .running
            .then(|| status.device.mission_id.clone())
            .flatten();
        let incomplete_missions = self
            .missions
            .incomplete()?
            .into_iter()
            .filter(|id| Some(id) != active.as_ref())
            .collect();

        Ok(MissionListing {
            missions,
            incomplete_missions,
            status,
        })
    }

    /// Adopt a mission process left running by a previous supervisor
    /// instance so it is still reaped when it exits.
    pub fn recover(&self) -> Option<JoinHandle<ReapOutcome>> {
        let pid = self.registry.running_pid()?;
        let device = self.state.read();
        let mission_id = device
            .mission_id
            .filter(|_| device.pid == Some(pid));

        info!(
            pid,
            mission_id = mission_id.as_deref().unwrap_or("-"),
            "Adopting running mission process"
        );
        let reaper = Reaper::new(
            pid,
            mission_id,
            self.registry.clone(),
            self.state.clone(),
            self.missions.clone(),
            self.lock.clone(),
        );
        Some(reaper.watch_pid(self.registry.probe().clone(), self.poll_interval))
    }
}
