//! Envmon Stream
//!
//! Live push events for observers of the field device: periodic
//! heartbeats, the latest telemetry row, and newly appended mission log
//! lines. Everything is derived by polling files written by the mission
//! process and the supervisor.

pub mod broadcaster;
pub mod error;
pub mod tail;

pub use broadcaster::{Cadence, EventBroadcaster, Heartbeat, StreamEvent};
pub use error::{StreamError, StreamResult};
pub use tail::{tail_last_line, LogCursor};
