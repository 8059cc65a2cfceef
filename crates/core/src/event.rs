//! Structured mission event log records.
//!
//! One [`MissionEvent`] per line of a mission's `events.jsonl`. Extra
//! fields are flattened into the top-level object so observers see
//! `{"ts_epoch":..,"level":"INFO","msg":"..","mission_id":".."}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::epoch_millis_f64;

/// Severity level for mission events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

/// A single line of a mission's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionEvent {
    /// Seconds since epoch, millisecond precision
    pub ts_epoch: f64,
    pub level: EventLevel,
    pub msg: String,
    /// Free-form context
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl MissionEvent {
    /// Create an event stamped with the current time.
    pub fn new(level: EventLevel, msg: impl Into<String>) -> Self {
        Self {
            ts_epoch: epoch_millis_f64(),
            level,
            msg: msg.into(),
            fields: Map::new(),
        }
    }

    pub fn info(msg: impl Into<String>) -> Self {
        Self::new(EventLevel::Info, msg)
    }

    pub fn warn(msg: impl Into<String>) -> Self {
        Self::new(EventLevel::Warn, msg)
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::new(EventLevel::Error, msg)
    }

    /// Attach a key-value pair.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Render as a single JSON line without the trailing newline.
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
