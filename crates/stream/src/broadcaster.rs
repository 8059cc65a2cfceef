//! Per-observer event broadcaster.
//!
//! Each connected observer owns one [`EventBroadcaster`]. It polls the
//! device state file and the active mission's files on a fixed tick and
//! turns what it finds into [`StreamEvent`]s. Observers never share
//! cursors, so one slow or reconnecting client cannot affect another.

use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_stream::Stream;
use tracing::debug;

use envmon_core::config::StreamConfig;
use envmon_core::{epoch_millis_f64, MissionState, MissionStore, StateStore};

use crate::error::StreamResult;
use crate::tail::{tail_last_line, LogCursor};

/// Column name that starts the telemetry header row.
const TELEMETRY_HEADER_PREFIX: &str = "ts_epoch";

/// Periodic snapshot of the raw device state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heartbeat {
    pub ts_epoch: f64,
    pub state: MissionState,
    pub mission_id: Option<String>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
    pub pid: Option<u32>,
}

/// Events pushed to an observer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Heartbeat(Heartbeat),
    /// Most recent telemetry row, as raw CSV
    TelemetryLast {
        mission_id: String,
        csv_last_line: String,
    },
    /// One line of the mission event log, as raw JSON text
    Log { mission_id: String, event: String },
}

impl StreamEvent {
    /// Event name used on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Heartbeat(_) => "heartbeat",
            StreamEvent::TelemetryLast { .. } => "telemetry_last",
            StreamEvent::Log { .. } => "log",
        }
    }

    /// JSON payload for the event's data field.
    pub fn to_data(&self) -> StreamResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Cadence of the polling loop.
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    pub tick: Duration,
    pub heartbeat: Duration,
    pub telemetry: Duration,
}

impl From<&StreamConfig> for Cadence {
    fn from(config: &StreamConfig) -> Self {
        Self {
            tick: Duration::from_millis(config.tick_ms),
            heartbeat: Duration::from_millis(config.heartbeat_ms),
            telemetry: Duration::from_millis(config.telemetry_ms),
        }
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(200),
            heartbeat: Duration::from_secs(1),
            telemetry: Duration::from_secs(2),
        }
    }
}

#[derive(Debug)]
pub struct EventBroadcaster {
    state: StateStore,
    missions: MissionStore,
    cadence: Cadence,
    mission_id: Option<String>,
    cursor: Option<LogCursor>,
    last_heartbeat: Option<Instant>,
    last_telemetry: Option<Instant>,
}

impl EventBroadcaster {
    pub fn new(state: StateStore, missions: MissionStore, cadence: Cadence) -> Self {
        Self {
            state,
            missions,
            cadence,
            mission_id: None,
            cursor: None,
            last_heartbeat: None,
            last_telemetry: None,
        }
    }

    /// Run one polling step at time `now`.
    pub fn poll(&mut self, now: Instant) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let device = self.state.read();

        if due(self.last_heartbeat, now, self.cadence.heartbeat) {
            self.last_heartbeat = Some(now);
            events.push(StreamEvent::Heartbeat(Heartbeat {
                ts_epoch: epoch_millis_f64(),
                state: device.state,
                mission_id: device.mission_id.clone(),
                warnings: device.warnings.clone(),
                error: device.error.clone(),
                pid: device.pid,
            }));
        }

        if device.mission_id != self.mission_id {
            debug!(
                from = self.mission_id.as_deref().unwrap_or("-"),
                to = device.mission_id.as_deref().unwrap_or("-"),
                "Active mission changed; resetting log cursor"
            );
            self.mission_id = device.mission_id.clone();
            self.cursor = self
                .mission_id
                .as_deref()
                .map(|id| LogCursor::new(self.missions.events_path(id)));
        }

        let Some(mission_id) = self.mission_id.clone() else {
            return events;
        };

        if due(self.last_telemetry, now, self.cadence.telemetry) {
            self.last_telemetry = Some(now);
            match tail_last_line(&self.missions.telemetry_path(&mission_id)) {
                Ok(Some(line)) if !line.starts_with(TELEMETRY_HEADER_PREFIX) => {
                    events.push(StreamEvent::TelemetryLast {
                        mission_id: mission_id.clone(),
                        csv_last_line: line,
                    });
                }
                Ok(_) => {}
                Err(e) => debug!(mission_id = %mission_id, error = %e, "Telemetry tail failed"),
            }
        }

        if let Some(cursor) = self.cursor.as_mut() {
            match cursor.drain() {
                Ok(lines) => events.extend(lines.into_iter().map(|event| StreamEvent::Log {
                    mission_id: mission_id.clone(),
                    event,
                })),
                Err(e) => debug!(mission_id = %mission_id, error = %e, "Event log read failed"),
            }
        }

        events
    }

    /// Endless stream of events, one poll per tick. Ends only when the
    /// consumer drops it.
    pub fn into_stream(mut self) -> impl Stream<Item = StreamEvent> + Send + 'static {
        async_stream::stream! {
            let mut ticker = tokio::time::interval(self.cadence.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                for event in self.poll(Instant::now()) {
                    yield event;
                }
            }
        }
    }
}

fn due(last: Option<Instant>, now: Instant, every: Duration) -> bool {
    last.map_or(true, |last| now.saturating_duration_since(last) >= every)
}
