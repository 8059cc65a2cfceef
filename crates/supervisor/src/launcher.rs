//! Mission launch.

use serde::Serialize;
use std::fs::OpenOptions;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{error, info, warn};

use envmon_core::{
    epoch_seconds, new_mission_id, MissionEvent, MissionMeta, MissionProfile, MissionState,
    PidUpdate, Transition,
};

use crate::control::{signal_group, MissionSignal};
use crate::error::{Result, SupervisorError};
use crate::reaper::Reaper;
use crate::supervisor::MissionSupervisor;

/// Returned to the caller of a successful start.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchReceipt {
    pub pid: u32,
    pub mission_id: String,
    pub profile: MissionProfile,
}

impl MissionSupervisor {
    /// Launch a new mission process.
    ///
    /// Fails with `AlreadyRunning` and touches nothing if a verified
    /// mission is alive. On success the PID is registered, the device is
    /// ARMING, and a reaper is watching the child.
    pub async fn start(&self, profile: MissionProfile) -> Result<LaunchReceipt> {
        let _guard = self.lock.acquire().await?;

        if let Some(pid) = self.registry.running_pid() {
            return Err(SupervisorError::AlreadyRunning { pid });
        }

        let mission_id = new_mission_id();
        self.missions.create(&mission_id)?;
        self.missions.write_meta(&MissionMeta::new(
            mission_id.clone(),
            profile.clone(),
            epoch_seconds(),
        ))?;

        let log_path = self.missions.process_log_path(&mission_id);
        let stdout = OpenOptions::new().create(true).append(true).open(&log_path)?;
        let stderr = stdout.try_clone()?;

        let mut command = Command::new(&self.logger.program);
        command
            .args(&self.logger.args)
            .args(profile.to_args(&mission_id))
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .process_group(0);
        if let Some(dir) = &self.logger.working_dir {
            command.current_dir(dir);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(program = %self.logger.program, error = %e, "Mission process failed to launch");
                let event = MissionEvent::error("Mission process failed to launch.")
                    .with("error", e.to_string());
                if let Err(log_err) = self.missions.append_event(&mission_id, &event) {
                    warn!(mission_id = %mission_id, error = %log_err, "Failed to record launch failure");
                }
                return Err(SupervisorError::LaunchFailure(e));
            }
        };

        let Some(pid) = child.id() else {
            // Exited and already reaped before we could look at it
            return Err(SupervisorError::LaunchFailure(std::io::Error::new(
                std::io::ErrorKind::Other,
                "mission process exited immediately",
            )));
        };

        let recorded = self.record_launch(pid, &mission_id, &profile);
        if let Err(e) = &recorded {
            error!(pid, error = %e, "Failed to record mission launch; terminating it");
            if let Err(signal_err) = signal_group(pid, MissionSignal::Stop) {
                warn!(pid, error = %signal_err, "Stop signal failed; killing mission process");
                if let Err(kill_err) = child.start_kill() {
                    error!(pid, error = %kill_err, "Failed to kill mission process");
                }
            }
        }

        // Watched on every path so the child is always reaped.
        Reaper::new(
            pid,
            Some(mission_id.clone()),
            self.registry.clone(),
            self.state.clone(),
            self.missions.clone(),
            self.lock.clone(),
        )
        .watch_child(child);
        recorded?;

        info!(pid, mission_id = %mission_id, "Mission launched");
        Ok(LaunchReceipt {
            pid,
            mission_id,
            profile,
        })
    }

    /// Register `pid` and move the device to ARMING.
    fn record_launch(&self, pid: u32, mission_id: &str, profile: &MissionProfile) -> Result<()> {
        self.registry.write(pid)?;
        self.state.transition(
            Transition::to(MissionState::Arming)
                .mission(mission_id)
                .profile(profile.clone())
                .pid(PidUpdate::Set(pid)),
        )?;
        Ok(())
    }
}
