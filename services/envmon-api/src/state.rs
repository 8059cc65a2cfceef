use envmon_core::EnvmonConfig;
use envmon_supervisor::MissionSupervisor;

pub struct AppState {
    pub config: EnvmonConfig,
    pub supervisor: MissionSupervisor,
}

impl AppState {
    pub fn new(config: EnvmonConfig) -> Self {
        let supervisor = MissionSupervisor::new(&config);
        Self { config, supervisor }
    }
}
