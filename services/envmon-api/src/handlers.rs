use axum::{body::Bytes, extract::State, response::Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use envmon_core::persist::write_atomic;
use envmon_core::{CameraMode, FixedLocation, GpsMode, LocationMode, MissionProfile};
use envmon_supervisor::{MissionListing, StatusSnapshot};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "ok": true,
        "service": "envmon-api",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

pub async fn device_info(State(state): State<Arc<AppState>>) -> Json<Value> {
    let device_uuid = device_uuid(&state.config.paths.device_id_file);
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_default();

    Json(json!({
        "ok": true,
        "device_uuid": device_uuid,
        "hostname": hostname,
    }))
}

pub async fn status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    Ok(Json(state.supervisor.status().await?))
}

pub async fn list_missions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MissionListing>, ApiError> {
    Ok(Json(state.supervisor.list_missions().await?))
}

/// Body of `POST /missions/start`. Every field is optional.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StartRequest {
    pub duration: u64,
    pub sample_hz: f64,
    pub photo_every: u64,
    pub gps_mode: GpsMode,
    pub camera_mode: CameraMode,
    pub location_mode: LocationMode,
    pub fixed_location: Option<FixedLocation>,
    pub gps_timeout_s: u64,
    pub gps_stable_s: u64,
}

impl Default for StartRequest {
    fn default() -> Self {
        let profile = MissionProfile::default();
        Self {
            duration: profile.duration_s,
            sample_hz: profile.sample_hz,
            photo_every: profile.photo_every_s,
            gps_mode: profile.gps_mode,
            camera_mode: profile.camera_mode,
            location_mode: profile.location_mode,
            fixed_location: None,
            gps_timeout_s: profile.gps_timeout_s,
            gps_stable_s: profile.gps_stable_s,
        }
    }
}

impl From<StartRequest> for MissionProfile {
    fn from(req: StartRequest) -> Self {
        MissionProfile {
            duration_s: req.duration,
            sample_hz: req.sample_hz,
            photo_every_s: req.photo_every,
            gps_mode: req.gps_mode,
            camera_mode: req.camera_mode,
            location_mode: req.location_mode,
            fixed_location: req.fixed_location.unwrap_or_default(),
            gps_timeout_s: req.gps_timeout_s,
            gps_stable_s: req.gps_stable_s,
        }
    }
}

impl StartRequest {
    /// An empty or whitespace-only body means "all defaults".
    pub fn parse(body: &[u8]) -> Result<Self, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let req: Self =
            serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        if !(req.sample_hz.is_finite() && req.sample_hz > 0.0) {
            return Err(ApiError::BadRequest(
                "sample_hz must be greater than 0".to_string(),
            ));
        }
        Ok(req)
    }
}

pub async fn start_mission(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let profile: MissionProfile = StartRequest::parse(&body)?.into();
    let receipt = state.supervisor.start(profile).await?;

    Ok(Json(json!({
        "ok": true,
        "pid": receipt.pid,
        "mission_id": receipt.mission_id,
        "profile": receipt.profile,
    })))
}

pub async fn stop_mission(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    state.supervisor.stop().await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn abort_mission(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    state.supervisor.abort().await?;
    Ok(Json(json!({ "ok": true })))
}

/// Stable device identifier, created on first use.
fn device_uuid(path: &Path) -> String {
    if let Some(existing) = std::fs::read(path)
        .ok()
        .and_then(|raw| serde_json::from_slice::<Value>(&raw).ok())
        .and_then(|v| v.get("device_uuid")?.as_str().map(str::trim).map(String::from))
        .filter(|id| !id.is_empty())
    {
        return existing;
    }

    let id = Uuid::new_v4().to_string();
    let record = json!({ "device_uuid": id });
    match serde_json::to_vec_pretty(&record) {
        Ok(bytes) => match write_atomic(path, &bytes) {
            Ok(()) => info!(device_uuid = %id, "Generated device identifier"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to persist device identifier"),
        },
        Err(e) => warn!(error = %e, "Failed to encode device identifier"),
    }
    id
}
