//! Configuration management for envmon.
//!
//! Every field has a default so a device boots with no configuration file
//! at all. A TOML file (path in `ENVMON_CONFIG`) is layered on top, then
//! individual `ENVMON_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};

/// Environment variable naming the TOML configuration file.
pub const CONFIG_PATH_ENV: &str = "ENVMON_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvmonConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logger: LoggerConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

/// Locations of the persisted singletons and mission data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,
    #[serde(default = "default_missions_dir")]
    pub missions_dir: PathBuf,
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
    #[serde(default = "default_device_id_file")]
    pub device_id_file: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub log_format: LogFormat,
}

/// How the supervisor launches the mission child process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Executable to spawn.
    #[serde(default = "default_logger_program")]
    pub program: String,
    /// Arguments placed before the mission arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Substring that must appear in a live process's argv for it to be
    /// recognised as our mission process.
    #[serde(default = "default_logger_signature")]
    pub signature: String,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

/// Polling cadence of the event broadcaster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    #[serde(default = "default_telemetry_ms")]
    pub telemetry_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_state_file() -> PathBuf {
    PathBuf::from("/tmp/envmon_device_state.json")
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("/tmp/envmon_logger.pid")
}

fn default_lock_file() -> PathBuf {
    PathBuf::from("/tmp/envmon_launch.lock")
}

fn default_missions_dir() -> PathBuf {
    PathBuf::from("storage/missions")
}

fn default_export_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_device_id_file() -> PathBuf {
    PathBuf::from("storage/device_id.json")
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_logger_program() -> String {
    "envmon-logger".to_string()
}

fn default_logger_signature() -> String {
    "envmon-logger".to_string()
}

fn default_tick_ms() -> u64 {
    200
}

fn default_heartbeat_ms() -> u64 {
    1000
}

fn default_telemetry_ms() -> u64 {
    2000
}

fn default_lock_timeout_ms() -> u64 {
    2000
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            pid_file: default_pid_file(),
            lock_file: default_lock_file(),
            missions_dir: default_missions_dir(),
            export_dir: default_export_dir(),
            device_id_file: default_device_id_file(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            log_format: LogFormat::default(),
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            program: default_logger_program(),
            args: Vec::new(),
            signature: default_logger_signature(),
            working_dir: None,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            heartbeat_ms: default_heartbeat_ms(),
            telemetry_ms: default_telemetry_ms(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl EnvmonConfig {
    #[cfg(feature = "toml")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CoreError::ConfigParse(e.to_string()))
    }

    /// Load the effective configuration: defaults, then the file named by
    /// `ENVMON_CONFIG` (if any), then environment overrides.
    pub fn load() -> Result<Self> {
        let base = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load_file(Path::new(&path))?,
            _ => Self::default(),
        };
        let config = base.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "toml")]
    fn load_file(path: &Path) -> Result<Self> {
        Self::from_file(path)
    }

    #[cfg(not(feature = "toml"))]
    fn load_file(path: &Path) -> Result<Self> {
        Err(CoreError::ConfigParse(format!(
            "{} given but TOML support is disabled",
            path.display()
        )))
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(port) = env_value("ENVMON_PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.api.port = port;
        }
        if let Some(bind) = env_value("ENVMON_BIND") {
            self.api.bind = bind;
        }
        if let Some(format) = env_value("ENVMON_LOG_FORMAT") {
            self.api.log_format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Text,
            };
        }
        if let Some(path) = env_value("ENVMON_STATE_FILE") {
            self.paths.state_file = PathBuf::from(path);
        }
        if let Some(path) = env_value("ENVMON_PID_FILE") {
            self.paths.pid_file = PathBuf::from(path);
        }
        if let Some(path) = env_value("ENVMON_LOCK_FILE") {
            self.paths.lock_file = PathBuf::from(path);
        }
        if let Some(path) = env_value("ENVMON_MISSIONS_DIR") {
            self.paths.missions_dir = PathBuf::from(path);
        }
        if let Some(program) = env_value("ENVMON_LOGGER_PROGRAM") {
            self.logger.program = program;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.stream.tick_ms == 0 {
            return Err(CoreError::ConfigValidation(
                "stream.tick_ms must be greater than 0".to_string(),
            ));
        }
        if self.stream.heartbeat_ms < self.stream.tick_ms {
            return Err(CoreError::ConfigValidation(format!(
                "stream.heartbeat_ms ({}) must be >= stream.tick_ms ({})",
                self.stream.heartbeat_ms, self.stream.tick_ms
            )));
        }
        if self.stream.telemetry_ms < self.stream.tick_ms {
            return Err(CoreError::ConfigValidation(format!(
                "stream.telemetry_ms ({}) must be >= stream.tick_ms ({})",
                self.stream.telemetry_ms, self.stream.tick_ms
            )));
        }
        if self.logger.program.trim().is_empty() {
            return Err(CoreError::ConfigValidation(
                "logger.program cannot be empty".to_string(),
            ));
        }
        if self.logger.signature.trim().is_empty() {
            return Err(CoreError::ConfigValidation(
                "logger.signature cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
