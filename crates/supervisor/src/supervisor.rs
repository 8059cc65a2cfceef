//! The mission supervisor facade used by the HTTP API.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use envmon_core::config::LoggerConfig;
use envmon_core::{EnvmonConfig, MissionStore, StateStore, Transition};

use crate::control::{signal_group, MissionSignal};
use crate::error::{Result, SupervisorError};
use crate::guard::LaunchLock;
use crate::liveness::{OsProcessProbe, ProcessProbe};
use crate::registry::ProcessRegistry;

/// Owns the persisted singletons and enforces the one-mission rule.
///
/// Cheap to clone; every handle shares the same files and lock.
#[derive(Debug, Clone)]
pub struct MissionSupervisor {
    pub(crate) state: StateStore,
    pub(crate) missions: MissionStore,
    pub(crate) registry: ProcessRegistry,
    pub(crate) lock: LaunchLock,
    pub(crate) logger: LoggerConfig,
    pub(crate) poll_interval: Duration,
}

impl MissionSupervisor {
    pub fn new(config: &EnvmonConfig) -> Self {
        let probe = Arc::new(OsProcessProbe::new(config.logger.signature.clone()));
        Self::with_probe(config, probe)
    }

    /// Construct with a custom process probe.
    pub fn with_probe(config: &EnvmonConfig, probe: Arc<dyn ProcessProbe>) -> Self {
        Self {
            state: StateStore::new(&config.paths.state_file),
            missions: MissionStore::new(&config.paths.missions_dir),
            registry: ProcessRegistry::new(&config.paths.pid_file, probe),
            lock: LaunchLock::new(
                &config.paths.lock_file,
                Duration::from_millis(config.supervisor.lock_timeout_ms),
            ),
            logger: config.logger.clone(),
            poll_interval: Duration::from_millis(config.stream.tick_ms.max(1)),
        }
    }

    pub fn state_store(&self) -> &StateStore {
        &self.state
    }

    pub fn mission_store(&self) -> &MissionStore {
        &self.missions
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Ask the running mission to stop gracefully.
    pub async fn stop(&self) -> Result<()> {
        self.signal(MissionSignal::Stop).await
    }

    /// Ask the running mission to abort.
    pub async fn abort(&self) -> Result<()> {
        self.signal(MissionSignal::Abort).await
    }

    /// The mission process writes its own terminal state once it handles
    /// the signal, so a successful request leaves the device state alone.
    async fn signal(&self, signal: MissionSignal) -> Result<()> {
        let _guard = self.lock.acquire().await?;

        let Some(pid) = self.registry.running_pid() else {
            self.state.transition(Transition::idle())?;
            return Err(SupervisorError::NotRunning);
        };

        if let Err(e) = signal_group(pid, signal) {
            warn!(pid, signal = signal.name(), error = %e, "Signal delivery failed");
            return Err(e);
        }
        self.registry.clear_if(pid);
        info!(pid, signal = signal.name(), "Mission signalled");
        Ok(())
    }
}
