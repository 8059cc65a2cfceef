//! Device and mission types shared by the supervisor, the stream and the
//! mission process.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Lifecycle state of the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionState {
    #[default]
    Idle,
    Arming,
    Running,
    Completed,
    Aborted,
    Error,
}

impl MissionState {
    /// States in which a live mission process is expected to exist.
    pub fn is_active(self) -> bool {
        matches!(self, MissionState::Arming | MissionState::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MissionState::Idle => "IDLE",
            MissionState::Arming => "ARMING",
            MissionState::Running => "RUNNING",
            MissionState::Completed => "COMPLETED",
            MissionState::Aborted => "ABORTED",
            MissionState::Error => "ERROR",
        }
    }
}

impl fmt::Display for MissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpsMode {
    Off,
    #[default]
    BestEffort,
    Required,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraMode {
    #[default]
    On,
    Off,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationMode {
    #[default]
    Gps,
    Fixed,
    None,
}

macro_rules! cli_names {
    ($ty:ty { $($variant:path => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_arg(self) -> &'static str {
                match self {
                    $($variant => $name),+
                }
            }
        }

        impl std::str::FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok($variant),)+
                    other => Err(format!("unknown value '{}'", other)),
                }
            }
        }
    };
}

cli_names!(GpsMode {
    GpsMode::Off => "off",
    GpsMode::BestEffort => "best_effort",
    GpsMode::Required => "required",
});

cli_names!(CameraMode {
    CameraMode::On => "on",
    CameraMode::Off => "off",
});

cli_names!(LocationMode {
    LocationMode::Gps => "gps",
    LocationMode::Fixed => "fixed",
    LocationMode::None => "none",
});

/// Operator supplied coordinates used when `location_mode = fixed`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixedLocation {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub alt_m: Option<f64>,
}

impl FixedLocation {
    pub fn is_complete(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }
}

/// Snapshot of a mission's configuration, stored in the device state and
/// the mission meta file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionProfile {
    pub duration_s: u64,
    pub sample_hz: f64,
    pub photo_every_s: u64,
    pub gps_mode: GpsMode,
    pub camera_mode: CameraMode,
    pub location_mode: LocationMode,
    pub fixed_location: FixedLocation,
    pub gps_timeout_s: u64,
    pub gps_stable_s: u64,
}

impl Default for MissionProfile {
    fn default() -> Self {
        Self {
            duration_s: 60,
            sample_hz: 2.0,
            photo_every_s: 5,
            gps_mode: GpsMode::default(),
            camera_mode: CameraMode::default(),
            location_mode: LocationMode::default(),
            fixed_location: FixedLocation::default(),
            gps_timeout_s: 180,
            gps_stable_s: 5,
        }
    }
}

impl MissionProfile {
    /// Command line understood by the mission process for this profile.
    pub fn to_args(&self, mission_id: &str) -> Vec<String> {
        let mut args = vec![
            "--mission-id".to_string(),
            mission_id.to_string(),
            "--duration".to_string(),
            self.duration_s.to_string(),
            "--sample-hz".to_string(),
            self.sample_hz.to_string(),
            "--photo-every".to_string(),
            self.photo_every_s.to_string(),
            "--gps-mode".to_string(),
            self.gps_mode.as_arg().to_string(),
            "--camera-mode".to_string(),
            self.camera_mode.as_arg().to_string(),
            "--location-mode".to_string(),
            self.location_mode.as_arg().to_string(),
            "--gps-timeout".to_string(),
            self.gps_timeout_s.to_string(),
            "--gps-stable".to_string(),
            self.gps_stable_s.to_string(),
        ];

        let fixed = [
            ("--fixed-lat", self.fixed_location.lat),
            ("--fixed-lon", self.fixed_location.lon),
            ("--fixed-alt", self.fixed_location.alt_m),
        ];
        for (flag, value) in fixed {
            if let Some(value) = value {
                args.push(flag.to_string());
                args.push(value.to_string());
            }
        }

        args
    }
}

/// The persisted device state record.
///
/// Missing fields are back-filled with defaults on read so older or newer
/// writers never make the record unreadable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceState {
    pub state: MissionState,
    pub since_epoch: i64,
    pub mission_id: Option<String>,
    pub profile: Option<MissionProfile>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
    pub pid: Option<u32>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            state: MissionState::Idle,
            since_epoch: epoch_seconds(),
            mission_id: None,
            profile: None,
            warnings: Vec::new(),
            error: None,
            pid: None,
        }
    }
}

/// How a transition treats the stored pid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PidUpdate {
    #[default]
    Unchanged,
    Set(u32),
    Clear,
}

/// A state transition. Every field except `pid` replaces the stored value.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: MissionState,
    pub mission_id: Option<String>,
    pub profile: Option<MissionProfile>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
    pub pid: PidUpdate,
}

impl Transition {
    pub fn to(state: MissionState) -> Self {
        Self {
            state,
            mission_id: None,
            profile: None,
            warnings: Vec::new(),
            error: None,
            pid: PidUpdate::Unchanged,
        }
    }

    /// Back to IDLE with mission fields and pid cleared.
    pub fn idle() -> Self {
        Self::to(MissionState::Idle).pid(PidUpdate::Clear)
    }

    pub fn mission(mut self, mission_id: impl Into<String>) -> Self {
        self.mission_id = Some(mission_id.into());
        self
    }

    pub fn profile(mut self, profile: MissionProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn pid(mut self, pid: PidUpdate) -> Self {
        self.pid = pid;
        self
    }

    /// Apply to `current`, stamping `since_epoch` with `now`.
    pub fn apply(self, current: DeviceState, now: i64) -> DeviceState {
        let pid = match self.pid {
            PidUpdate::Unchanged => current.pid,
            PidUpdate::Set(pid) => Some(pid),
            PidUpdate::Clear => None,
        };

        DeviceState {
            state: self.state,
            since_epoch: now,
            mission_id: self.mission_id,
            profile: self.profile,
            warnings: self.warnings,
            error: if self.state == MissionState::Error {
                self.error
            } else {
                None
            },
            pid,
        }
    }
}

/// Current time as whole seconds since the Unix epoch.
pub fn epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Current time as seconds since the Unix epoch, millisecond precision.
pub fn epoch_millis_f64() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.as_millis() as f64) / 1000.0)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serializes_upper_case() {
        let json = serde_json::to_string(&MissionState::Arming).unwrap();
        assert_eq!(json, "\"ARMING\"");

        let parsed: MissionState = serde_json::from_str("\"ABORTED\"").unwrap();
        assert_eq!(parsed, MissionState::Aborted);
    }

    #[test]
    fn test_device_state_backfills_missing_fields() {
        let parsed: DeviceState =
            serde_json::from_str(r#"{"state":"RUNNING","pid":42,"future_field":true}"#).unwrap();

        assert_eq!(parsed.state, MissionState::Running);
        assert_eq!(parsed.pid, Some(42));
        assert!(parsed.warnings.is_empty());
        assert!(parsed.mission_id.is_none());
    }

    #[test]
    fn test_transition_pid_tristate() {
        let current = DeviceState {
            pid: Some(100),
            ..DeviceState::default()
        };

        let kept = Transition::to(MissionState::Running).apply(current.clone(), 10);
        assert_eq!(kept.pid, Some(100));

        let set = Transition::to(MissionState::Arming)
            .pid(PidUpdate::Set(200))
            .apply(current.clone(), 10);
        assert_eq!(set.pid, Some(200));

        let cleared = Transition::idle().apply(current, 10);
        assert_eq!(cleared.pid, None);
        assert_eq!(cleared.since_epoch, 10);
    }

    #[test]
    fn test_transition_replaces_warnings_and_drops_error_outside_error_state() {
        let current = DeviceState {
            warnings: vec!["old".to_string()],
            error: Some("boom".to_string()),
            ..DeviceState::default()
        };

        let next = Transition::to(MissionState::Completed)
            .warning("new")
            .error("ignored")
            .apply(current, 1);

        assert_eq!(next.warnings, vec!["new".to_string()]);
        assert!(next.error.is_none());

        let failed = Transition::to(MissionState::Error)
            .error("GPS required but no fix.")
            .apply(next, 2);
        assert_eq!(failed.error.as_deref(), Some("GPS required but no fix."));
    }

    #[test]
    fn test_profile_args_include_fixed_location_only_when_set() {
        let mut profile = MissionProfile::default();
        let args = profile.to_args("m1");
        assert!(!args.iter().any(|a| a == "--fixed-lat"));
        assert!(args.windows(2).any(|w| w[0] == "--gps-mode" && w[1] == "best_effort"));

        profile.location_mode = LocationMode::Fixed;
        profile.fixed_location.lat = Some(48.85);
        profile.fixed_location.lon = Some(2.35);
        let args = profile.to_args("m1");
        assert!(args.windows(2).any(|w| w[0] == "--fixed-lat" && w[1] == "48.85"));
        assert!(!args.iter().any(|a| a == "--fixed-alt"));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("required".parse::<GpsMode>(), Ok(GpsMode::Required));
        assert_eq!("none".parse::<LocationMode>(), Ok(LocationMode::None));
        assert!("sometimes".parse::<CameraMode>().is_err());
    }
}
