//! On-disk mission layout.
//!
//! ```text
//! <missions_dir>/<mission_id>/
//!     meta.json       profile, start/end timestamps, stop reason
//!     telemetry.csv   append-only, fixed header
//!     images.csv      append-only, fixed header
//!     images/         captured frames
//!     events.jsonl    one MissionEvent per line
//!     process.log     mission process stdout/stderr
//! ```
//!
//! Directories are never deleted here.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::event::MissionEvent;
use crate::persist::write_atomic;
use crate::types::MissionProfile;

pub const META_FILE: &str = "meta.json";
pub const TELEMETRY_FILE: &str = "telemetry.csv";
pub const IMAGES_FILE: &str = "images.csv";
pub const IMAGES_DIR: &str = "images";
pub const EVENTS_FILE: &str = "events.jsonl";
pub const PROCESS_LOG_FILE: &str = "process.log";

pub const TELEMETRY_HEADER: [&str; 11] = [
    "ts_epoch",
    "lat",
    "lon",
    "alt_m",
    "fix_quality",
    "satellites",
    "hdop",
    "temp_c",
    "hum_pct",
    "press_hpa",
    "gas_ohms",
];

pub const IMAGES_HEADER: [&str; 5] = ["ts_epoch", "lat", "lon", "alt_m", "filename"];

/// Why a mission ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopReason {
    /// Graceful stop requested by the operator
    Stop,
    /// Abort requested by the operator
    Abort,
    /// Configured duration elapsed
    Timer,
    /// Preflight failure inside the mission process
    Error,
    /// Process died without recording an end
    Crash,
}

/// Contents of `meta.json`.
///
/// Fields this crate does not know about are kept in `extra` so a rewrite
/// never drops what the mission process recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionMeta {
    pub mission_id: String,
    pub started_at_epoch: i64,
    #[serde(default)]
    pub profile: MissionProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_epoch: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MissionMeta {
    pub fn new(mission_id: impl Into<String>, profile: MissionProfile, started_at_epoch: i64) -> Self {
        Self {
            mission_id: mission_id.into(),
            started_at_epoch,
            profile,
            ended_at_epoch: None,
            stop_reason: None,
            notes: None,
            extra: Map::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.ended_at_epoch.is_some()
    }

    pub fn finish(&mut self, reason: StopReason, ended_at_epoch: i64) {
        self.ended_at_epoch = Some(ended_at_epoch);
        self.stop_reason = Some(reason);
    }
}

/// One telemetry sample, rendered in [`TELEMETRY_HEADER`] column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryRow {
    pub ts_epoch: f64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt_m: Option<f64>,
    pub fix_quality: u8,
    pub satellites: u8,
    pub hdop: f64,
    pub temp_c: Option<f64>,
    pub hum_pct: Option<f64>,
    pub press_hpa: Option<f64>,
    pub gas_ohms: Option<f64>,
}

impl TelemetryRow {
    pub fn cells(&self) -> Vec<String> {
        vec![
            format!("{:.3}", self.ts_epoch),
            opt_cell(self.lat),
            opt_cell(self.lon),
            opt_cell(self.alt_m),
            self.fix_quality.to_string(),
            self.satellites.to_string(),
            self.hdop.to_string(),
            opt_cell(self.temp_c),
            opt_cell(self.hum_pct),
            opt_cell(self.press_hpa),
            opt_cell(self.gas_ohms),
        ]
    }
}

/// One captured image, rendered in [`IMAGES_HEADER`] column order.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRow {
    pub ts_epoch: f64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt_m: Option<f64>,
    pub filename: String,
}

impl ImageRow {
    pub fn cells(&self) -> Vec<String> {
        vec![
            format!("{:.3}", self.ts_epoch),
            opt_cell(self.lat),
            opt_cell(self.lon),
            opt_cell(self.alt_m),
            self.filename.clone(),
        ]
    }
}

fn opt_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Sortable unique mission id: `YYYYMMDD_HHMMSS_<8 hex>` (UTC).
pub fn new_mission_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), &suffix[..8])
}

/// Mission ids name directories, so anything that could escape the
/// missions root is rejected.
pub fn is_valid_mission_id(mission_id: &str) -> bool {
    !mission_id.is_empty()
        && mission_id != "."
        && mission_id != ".."
        && mission_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

/// Append a CSV row, writing `header` first if the file is new.
pub fn append_csv_row(path: &Path, header: &[&str], row: &[String]) -> std::io::Result<()> {
    let exists = path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut buf = String::new();
    if !exists {
        buf.push_str(&header.join(","));
        buf.push('\n');
    }
    buf.push_str(&row.join(","));
    buf.push('\n');
    file.write_all(buf.as_bytes())
}

#[derive(Debug, Clone)]
pub struct MissionStore {
    root: PathBuf,
}

impl MissionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn mission_dir(&self, mission_id: &str) -> PathBuf {
        self.root.join(mission_id)
    }

    pub fn meta_path(&self, mission_id: &str) -> PathBuf {
        self.mission_dir(mission_id).join(META_FILE)
    }

    pub fn telemetry_path(&self, mission_id: &str) -> PathBuf {
        self.mission_dir(mission_id).join(TELEMETRY_FILE)
    }

    pub fn images_path(&self, mission_id: &str) -> PathBuf {
        self.mission_dir(mission_id).join(IMAGES_FILE)
    }

    pub fn images_dir(&self, mission_id: &str) -> PathBuf {
        self.mission_dir(mission_id).join(IMAGES_DIR)
    }

    pub fn events_path(&self, mission_id: &str) -> PathBuf {
        self.mission_dir(mission_id).join(EVENTS_FILE)
    }

    pub fn process_log_path(&self, mission_id: &str) -> PathBuf {
        self.mission_dir(mission_id).join(PROCESS_LOG_FILE)
    }

    /// Resolve an existing mission directory or fail with `MissionNotFound`.
    pub fn locate(&self, mission_id: &str) -> Result<PathBuf> {
        let dir = self.mission_dir(mission_id);
        if is_valid_mission_id(mission_id) && dir.is_dir() {
            Ok(dir)
        } else {
            Err(CoreError::MissionNotFound {
                mission_id: mission_id.to_string(),
            })
        }
    }

    /// Create the mission directory and its `images/` subdirectory.
    pub fn create(&self, mission_id: &str) -> Result<PathBuf> {
        let dir = self.mission_dir(mission_id);
        fs::create_dir_all(dir.join(IMAGES_DIR))?;
        Ok(dir)
    }

    pub fn write_meta(&self, meta: &MissionMeta) -> Result<()> {
        let contents = serde_json::to_vec_pretty(meta)?;
        write_atomic(&self.meta_path(&meta.mission_id), &contents)?;
        Ok(())
    }

    /// `None` when the meta file is missing or unreadable.
    pub fn read_meta(&self, mission_id: &str) -> Option<MissionMeta> {
        let raw = fs::read(self.meta_path(mission_id)).ok()?;
        match serde_json::from_slice(&raw) {
            Ok(meta) => Some(meta),
            Err(e) => {
                debug!(mission_id, error = %e, "Unreadable mission meta");
                None
            }
        }
    }

    /// Mission ids, newest first.
    pub fn list(&self) -> Result<Vec<String>> {
        fs::create_dir_all(&self.root)?;
        let mut ids: Vec<String> = fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| is_valid_mission_id(name))
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(ids)
    }

    /// Missions whose meta records no end, newest first.
    pub fn incomplete(&self) -> Result<Vec<String>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|id| !self.read_meta(id).map(|m| m.is_finished()).unwrap_or(false))
            .collect())
    }

    pub fn append_event(&self, mission_id: &str, event: &MissionEvent) -> Result<()> {
        let path = self.events_path(mission_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = event.to_line()?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    pub fn append_telemetry(&self, mission_id: &str, row: &TelemetryRow) -> Result<()> {
        append_csv_row(&self.telemetry_path(mission_id), &TELEMETRY_HEADER, &row.cells())?;
        Ok(())
    }

    pub fn append_image(&self, mission_id: &str, row: &ImageRow) -> Result<()> {
        append_csv_row(&self.images_path(mission_id), &IMAGES_HEADER, &row.cells())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, MissionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MissionStore::new(dir.path().join("missions"));
        (dir, store)
    }

    #[test]
    fn test_mission_id_shape() {
        let id = new_mission_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2].len(), 8);
        assert!(is_valid_mission_id(&id));
        assert_ne!(id, new_mission_id());
    }

    #[test]
    fn test_rejects_path_escaping_ids() {
        assert!(!is_valid_mission_id(".."));
        assert!(!is_valid_mission_id("../etc"));
        assert!(!is_valid_mission_id("a/b"));
        assert!(!is_valid_mission_id(""));
    }

    #[test]
    fn test_create_list_and_incomplete() {
        let (_dir, store) = store();
        store.create("20260101_000000_aaaaaaaa").unwrap();
        store.create("20260102_000000_bbbbbbbb").unwrap();

        let mut done = MissionMeta::new("20260101_000000_aaaaaaaa", MissionProfile::default(), 1);
        done.finish(StopReason::Timer, 61);
        store.write_meta(&done).unwrap();
        store
            .write_meta(&MissionMeta::new(
                "20260102_000000_bbbbbbbb",
                MissionProfile::default(),
                2,
            ))
            .unwrap();

        assert_eq!(
            store.list().unwrap(),
            vec!["20260102_000000_bbbbbbbb", "20260101_000000_aaaaaaaa"]
        );
        assert_eq!(store.incomplete().unwrap(), vec!["20260102_000000_bbbbbbbb"]);
        assert!(store.images_dir("20260101_000000_aaaaaaaa").is_dir());
    }

    #[test]
    fn test_meta_rewrite_preserves_unknown_fields() {
        let (_dir, store) = store();
        store.create("m1").unwrap();
        fs::write(
            store.meta_path("m1"),
            r#"{"mission_id":"m1","started_at_epoch":5,"gps_ready":true,"notes":"field"}"#,
        )
        .unwrap();

        let mut meta = store.read_meta("m1").unwrap();
        meta.finish(StopReason::Crash, 9);
        store.write_meta(&meta).unwrap();

        let raw: Value = serde_json::from_slice(&fs::read(store.meta_path("m1")).unwrap()).unwrap();
        assert_eq!(raw["gps_ready"], true);
        assert_eq!(raw["stop_reason"], "CRASH");
        assert_eq!(raw["ended_at_epoch"], 9);
    }

    #[test]
    fn test_csv_header_written_once() {
        let (_dir, store) = store();
        store.create("m1").unwrap();
        let row = TelemetryRow {
            ts_epoch: 10.0,
            hdop: 99.99,
            ..TelemetryRow::default()
        };
        store.append_telemetry("m1", &row).unwrap();
        store.append_telemetry("m1", &row).unwrap();

        let contents = fs::read_to_string(store.telemetry_path("m1")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], TELEMETRY_HEADER.join(","));
        assert_eq!(lines[1], "10.000,,,,0,0,99.99,,,,");
    }

    #[test]
    fn test_append_event_writes_json_lines() {
        let (_dir, store) = store();
        store
            .append_event("m1", &MissionEvent::info("Mission started."))
            .unwrap();
        store
            .append_event("m1", &MissionEvent::warn("capture_image failed"))
            .unwrap();

        let contents = fs::read_to_string(store.events_path("m1")).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.lines().all(|l| serde_json::from_str::<Value>(l).is_ok()));
    }

    #[test]
    fn test_locate_missing_mission() {
        let (_dir, store) = store();
        assert!(matches!(
            store.locate("nope"),
            Err(CoreError::MissionNotFound { .. })
        ));
    }

    #[test]
    fn test_locate_resolves_only_valid_existing_ids() {
        let (dir, store) = store();
        let created = store.create("m1").unwrap();
        assert_eq!(store.locate("m1").unwrap(), created);

        fs::create_dir_all(dir.path().join("outside")).unwrap();
        assert!(matches!(
            store.locate("../outside"),
            Err(CoreError::MissionNotFound { .. })
        ));
    }
}
