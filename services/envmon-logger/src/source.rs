//! Sensor abstraction for the mission process.
//!
//! Hardware drivers live outside this crate. A mission only needs a
//! position fix, an environmental reading and a way to capture a frame.

use std::io;
use std::path::Path;
use std::time::Duration;

use envmon_core::FixedLocation;

/// A GNSS position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Fix {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt_m: Option<f64>,
    pub fix_quality: u8,
    pub satellites: u8,
    pub hdop: f64,
}

impl Fix {
    /// Matches a receiver with no solution.
    pub fn none() -> Self {
        Self {
            hdop: 99.99,
            ..Self::default()
        }
    }

    pub fn has_fix(&self) -> bool {
        self.fix_quality > 0 && self.lat.is_some() && self.lon.is_some()
    }
}

/// Environmental sensor reading. `None` columns are written empty.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnvReading {
    pub temp_c: Option<f64>,
    pub hum_pct: Option<f64>,
    pub press_hpa: Option<f64>,
    pub gas_ohms: Option<f64>,
}

/// Everything a mission samples from. Calls may block on hardware.
pub trait TelemetrySource: Send {
    /// Wait up to `timeout` for a fix that holds for `stable`.
    fn wait_for_fix(&mut self, timeout: Duration, stable: Duration) -> Option<Fix>;

    /// Current position; [`Fix::none`] when there is no solution.
    fn read_fix(&mut self) -> Fix;

    fn read_environment(&mut self) -> EnvReading;

    /// Capture one frame to `path`.
    fn capture_image(&mut self, path: &Path) -> io::Result<()>;
}

/// Source for a device without attached sensors: reports the operator
/// supplied coordinates as its position and no environmental readings.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    location: FixedLocation,
}

impl StaticSource {
    pub fn new(location: FixedLocation) -> Self {
        Self { location }
    }

    fn fix(&self) -> Fix {
        if !self.location.is_complete() {
            return Fix::none();
        }
        Fix {
            lat: self.location.lat,
            lon: self.location.lon,
            alt_m: self.location.alt_m,
            fix_quality: 1,
            satellites: 0,
            hdop: 99.99,
        }
    }
}

impl TelemetrySource for StaticSource {
    fn wait_for_fix(&mut self, _timeout: Duration, _stable: Duration) -> Option<Fix> {
        Some(self.fix()).filter(Fix::has_fix)
    }

    fn read_fix(&mut self) -> Fix {
        self.fix()
    }

    fn read_environment(&mut self) -> EnvReading {
        EnvReading::default()
    }

    fn capture_image(&mut self, _path: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "no camera attached",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_source_without_location_has_no_fix() {
        let mut source = StaticSource::default();
        assert!(!source.read_fix().has_fix());
        assert_eq!(
            source.wait_for_fix(Duration::from_secs(1), Duration::from_secs(1)),
            None
        );
    }

    #[test]
    fn test_static_source_reports_configured_location() {
        let mut source = StaticSource::new(FixedLocation {
            lat: Some(1.0),
            lon: Some(2.0),
            alt_m: None,
        });
        let fix = source.read_fix();
        assert!(fix.has_fix());
        assert_eq!((fix.lat, fix.lon), (Some(1.0), Some(2.0)));
        assert!(source.capture_image(Path::new("/tmp/x.jpg")).is_err());
    }
}
