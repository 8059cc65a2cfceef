//! Mission run loop.
//!
//! ARMING → preflight → RUNNING → COMPLETED | ABORTED → IDLE, or
//! ARMING → ERROR when preflight fails. The device state, the mission
//! meta and the event log are written at every step so the supervisor
//! and stream observers can follow along.

use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use envmon_core::{
    epoch_millis_f64, epoch_seconds, CameraMode, GpsMode, ImageRow, LocationMode, MissionEvent,
    MissionMeta, MissionProfile, MissionState, MissionStore, PidUpdate, Result, StateStore,
    StopReason, TelemetryRow, Transition,
};

use crate::source::{Fix, TelemetrySource};

/// Exit status for a preflight failure.
pub const PREFLIGHT_EXIT_CODE: i32 = 2;

const MIN_SAMPLE_HZ: f64 = 0.1;

/// Operator request delivered while the mission runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRequest {
    Stop,
    Abort,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MissionOutcome {
    Finished(StopReason),
    PreflightFailed(String),
}

impl MissionOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            MissionOutcome::Finished(_) => 0,
            MissionOutcome::PreflightFailed(_) => PREFLIGHT_EXIT_CODE,
        }
    }
}

pub struct MissionRunner<S> {
    mission_id: String,
    profile: MissionProfile,
    state: StateStore,
    missions: MissionStore,
    source: S,
}

impl<S: TelemetrySource> MissionRunner<S> {
    pub fn new(
        mission_id: impl Into<String>,
        profile: MissionProfile,
        state: StateStore,
        missions: MissionStore,
        source: S,
    ) -> Self {
        Self {
            mission_id: mission_id.into(),
            profile,
            state,
            missions,
            source,
        }
    }

    pub async fn run(mut self, mut stop: watch::Receiver<Option<StopRequest>>) -> Result<MissionOutcome> {
        self.transition(MissionState::Arming)?;
        self.missions.create(&self.mission_id)?;
        let mut meta = self.missions.read_meta(&self.mission_id).unwrap_or_else(|| {
            MissionMeta::new(self.mission_id.clone(), self.profile.clone(), epoch_seconds())
        });

        let gps_ready = match self.preflight() {
            Ok(fix) => fix,
            Err(reason) => return self.fail_preflight(meta, reason),
        };

        meta.notes = Some("Recorded on device. Live via SSE.".to_string());
        meta.extra.insert(
            "gps_ready".to_string(),
            gps_ready.map_or(serde_json::Value::Null, |fix| {
                json!({ "lat": fix.lat, "lon": fix.lon, "alt_m": fix.alt_m,
                        "fix_quality": fix.fix_quality, "satellites": fix.satellites,
                        "hdop": fix.hdop })
            }),
        );
        self.missions.write_meta(&meta)?;

        self.transition(MissionState::Running)?;
        self.emit(MissionEvent::info("Mission started.").with("mission_id", self.mission_id.as_str()));
        info!(mission_id = %self.mission_id, "Mission started");

        let reason = self.sample_until_done(&mut stop).await;

        let (state, event) = match reason {
            StopReason::Abort => (MissionState::Aborted, MissionEvent::warn("Mission aborted by user.")),
            StopReason::Stop => (MissionState::Completed, MissionEvent::info("Mission stopped by user.")),
            _ => (MissionState::Completed, MissionEvent::info("Mission finished (timer).")),
        };
        self.transition(state)?;
        self.emit(event);

        meta.finish(reason, epoch_seconds());
        if let Err(e) = self.missions.write_meta(&meta) {
            error!(mission_id = %self.mission_id, error = %e, "Failed to record mission end");
        }
        self.state.transition(Transition::idle())?;
        info!(mission_id = %self.mission_id, ?reason, "Mission ended");

        Ok(MissionOutcome::Finished(reason))
    }

    /// Returns the fix obtained when GPS is required.
    fn preflight(&mut self) -> std::result::Result<Option<Fix>, String> {
        let mut gps_ready = None;
        match self.profile.gps_mode {
            GpsMode::Required => {
                self.emit(MissionEvent::info("Waiting for required GPS fix..."));
                let fix = self.source.wait_for_fix(
                    Duration::from_secs(self.profile.gps_timeout_s),
                    Duration::from_secs(self.profile.gps_stable_s),
                );
                if fix.is_none() {
                    self.emit(MissionEvent::error("GPS required but no stable fix. Aborting mission."));
                    return Err("GPS required but no fix.".to_string());
                }
                gps_ready = fix;
            }
            GpsMode::BestEffort => {
                self.emit(MissionEvent::info("GPS best-effort: starting without blocking."))
            }
            GpsMode::Off => self.emit(MissionEvent::info("GPS disabled for this mission.")),
        }

        if self.profile.location_mode == LocationMode::Fixed
            && !self.profile.fixed_location.is_complete()
        {
            self.emit(MissionEvent::error(
                "Location mode=fixed but fixed_lat/fixed_lon missing.",
            ));
            return Err("fixed location missing lat/lon".to_string());
        }

        Ok(gps_ready)
    }

    fn fail_preflight(&self, mut meta: MissionMeta, reason: String) -> Result<MissionOutcome> {
        warn!(mission_id = %self.mission_id, reason = %reason, "Preflight failed");
        self.state.transition(
            Transition::to(MissionState::Error)
                .mission(self.mission_id.clone())
                .profile(self.profile.clone())
                .error(reason.clone()),
        )?;
        meta.finish(StopReason::Error, epoch_seconds());
        self.missions.write_meta(&meta)?;
        Ok(MissionOutcome::PreflightFailed(reason))
    }

    async fn sample_until_done(
        &mut self,
        stop: &mut watch::Receiver<Option<StopRequest>>,
    ) -> StopReason {
        let period = Duration::from_secs_f64(1.0 / self.profile.sample_hz.max(MIN_SAMPLE_HZ));
        let deadline = tokio::time::Instant::now() + Duration::from_secs(self.profile.duration_s);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut next_photo = Instant::now();
        let mut frames: u32 = 0;

        loop {
            if let Some(request) = *stop.borrow_and_update() {
                return stop_reason(request);
            }
            tokio::select! {
                biased;
                Ok(()) = stop.changed() => continue,
                _ = tokio::time::sleep_until(deadline) => return StopReason::Timer,
                _ = ticker.tick() => {}
            }

            let fix = self.current_fix();
            let env = self.source.read_environment();
            let ts_epoch = epoch_millis_f64();
            let row = TelemetryRow {
                ts_epoch,
                lat: fix.lat,
                lon: fix.lon,
                alt_m: fix.alt_m,
                fix_quality: fix.fix_quality,
                satellites: fix.satellites,
                hdop: fix.hdop,
                temp_c: env.temp_c,
                hum_pct: env.hum_pct,
                press_hpa: env.press_hpa,
                gas_ohms: env.gas_ohms,
            };
            if let Err(e) = self.missions.append_telemetry(&self.mission_id, &row) {
                warn!(mission_id = %self.mission_id, error = %e, "Failed to append telemetry row");
            }

            let now = Instant::now();
            if self.profile.camera_mode == CameraMode::On
                && self.profile.photo_every_s > 0
                && now >= next_photo
            {
                frames += 1;
                self.capture(frames, ts_epoch, &fix);
                next_photo = now + Duration::from_secs(self.profile.photo_every_s);
            }
        }
    }

    fn current_fix(&mut self) -> Fix {
        match self.profile.location_mode {
            LocationMode::Fixed => {
                let fixed = &self.profile.fixed_location;
                Fix {
                    lat: fixed.lat,
                    lon: fixed.lon,
                    alt_m: fixed.alt_m,
                    ..Fix::none()
                }
            }
            LocationMode::None => Fix::none(),
            LocationMode::Gps if self.profile.gps_mode == GpsMode::Off => Fix::none(),
            LocationMode::Gps => self.source.read_fix(),
        }
    }

    fn capture(&mut self, frame: u32, ts_epoch: f64, fix: &Fix) {
        let filename = format!("{frame:06}.jpg");
        let path = self.missions.images_dir(&self.mission_id).join(&filename);
        match self.source.capture_image(&path) {
            Ok(()) => {
                let row = ImageRow {
                    ts_epoch,
                    lat: fix.lat,
                    lon: fix.lon,
                    alt_m: fix.alt_m,
                    filename,
                };
                if let Err(e) = self.missions.append_image(&self.mission_id, &row) {
                    warn!(mission_id = %self.mission_id, error = %e, "Failed to append image row");
                }
            }
            Err(e) => self.emit(MissionEvent::warn(format!("capture_image failed: {e}"))),
        }
    }

    /// Active-state write. The record always names this process, even when
    /// it was started by hand rather than by the supervisor.
    fn transition(&self, state: MissionState) -> Result<()> {
        self.state.transition(
            Transition::to(state)
                .mission(self.mission_id.clone())
                .profile(self.profile.clone())
                .pid(PidUpdate::Set(std::process::id())),
        )?;
        Ok(())
    }

    /// Event log writes never end a mission.
    fn emit(&self, event: MissionEvent) {
        if let Err(e) = self.missions.append_event(&self.mission_id, &event) {
            warn!(mission_id = %self.mission_id, msg = %event.msg, error = %e, "Failed to append event");
        }
    }
}

fn stop_reason(request: StopRequest) -> StopReason {
    match request {
        StopRequest::Stop => StopReason::Stop,
        StopRequest::Abort => StopReason::Abort,
    }
}
