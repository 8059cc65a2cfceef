//! Core functionality for the envmon field device.
//!
//! This crate provides the types and persisted records shared by the
//! supervisor API, the event stream and the mission process: the device
//! state file, the mission directory layout, configuration and logging.

pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod mission_store;
pub mod persist;
pub mod state_store;
pub mod types;

pub use config::{EnvmonConfig, LogFormat};
pub use error::{CoreError, Result};
pub use event::{EventLevel, MissionEvent};
pub use mission_store::{
    new_mission_id, ImageRow, MissionMeta, MissionStore, StopReason, TelemetryRow,
};
pub use state_store::StateStore;
pub use types::{
    epoch_millis_f64, epoch_seconds, CameraMode, DeviceState, FixedLocation, GpsMode,
    LocationMode, MissionProfile, MissionState, PidUpdate, Transition,
};
