use clap::Parser;

use envmon_core::{new_mission_id, CameraMode, FixedLocation, GpsMode, LocationMode, MissionProfile};

/// Record one mission: sample telemetry until the duration elapses or a
/// stop (SIGTERM) or abort (SIGUSR1, SIGINT) arrives.
#[derive(Parser, Debug)]
#[command(name = "envmon-logger")]
pub struct MissionArgs {
    /// Mission id; generated when omitted
    #[arg(long)]
    pub mission_id: Option<String>,

    /// Mission length in seconds
    #[arg(long, default_value_t = 60)]
    pub duration: u64,

    #[arg(long, default_value_t = 2.0)]
    pub sample_hz: f64,

    /// Seconds between photos; 0 disables the camera
    #[arg(long, default_value_t = 5)]
    pub photo_every: u64,

    #[arg(long, default_value = "best_effort")]
    pub gps_mode: GpsMode,

    #[arg(long, default_value = "on")]
    pub camera_mode: CameraMode,

    #[arg(long, default_value = "gps")]
    pub location_mode: LocationMode,

    #[arg(long, allow_negative_numbers = true)]
    pub fixed_lat: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    pub fixed_lon: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    pub fixed_alt: Option<f64>,

    /// Seconds to wait for a GPS fix when gps_mode is required
    #[arg(long, default_value_t = 180)]
    pub gps_timeout: u64,

    /// Seconds a fix must hold before it counts as stable
    #[arg(long, default_value_t = 5)]
    pub gps_stable: u64,
}

impl MissionArgs {
    pub fn mission_id(&self) -> String {
        self.mission_id.clone().unwrap_or_else(new_mission_id)
    }

    pub fn profile(&self) -> MissionProfile {
        MissionProfile {
            duration_s: self.duration,
            sample_hz: self.sample_hz,
            photo_every_s: self.photo_every,
            gps_mode: self.gps_mode,
            camera_mode: self.camera_mode,
            location_mode: self.location_mode,
            fixed_location: FixedLocation {
                lat: self.fixed_lat,
                lon: self.fixed_lon,
                alt_m: self.fixed_alt,
            },
            gps_timeout_s: self.gps_timeout,
            gps_stable_s: self.gps_stable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_profile_defaults() {
        let args = MissionArgs::try_parse_from(["envmon-logger"]).unwrap();
        assert_eq!(args.profile(), MissionProfile::default());
        assert!(args.mission_id.is_none());
    }

    #[test]
    fn test_supervisor_command_line_round_trips() {
        let mut profile = MissionProfile {
            duration_s: 120,
            sample_hz: 0.5,
            gps_mode: GpsMode::Required,
            camera_mode: CameraMode::Off,
            location_mode: LocationMode::Fixed,
            ..MissionProfile::default()
        };
        profile.fixed_location = FixedLocation {
            lat: Some(-33.45),
            lon: Some(-70.66),
            alt_m: Some(570.0),
        };

        let argv = std::iter::once("envmon-logger".to_string())
            .chain(profile.to_args("20240101_000000_abcdef01"));
        let args = MissionArgs::try_parse_from(argv).unwrap();

        assert_eq!(args.mission_id(), "20240101_000000_abcdef01");
        assert_eq!(args.profile(), profile);
    }

    #[test]
    fn test_rejects_unknown_mode() {
        assert!(MissionArgs::try_parse_from(["envmon-logger", "--gps-mode", "sometimes"]).is_err());
    }
}
