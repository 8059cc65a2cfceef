use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use envmon_stream::{Cadence, EventBroadcaster, StreamEvent};

use crate::state::AppState;

/// `GET /stream`: one broadcaster per connected observer.
pub async fn event_stream(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let supervisor = &state.supervisor;
    let broadcaster = EventBroadcaster::new(
        supervisor.state_store().clone(),
        supervisor.mission_store().clone(),
        Cadence::from(&state.config.stream),
    );
    debug!("Stream observer connected");

    let events = broadcaster
        .into_stream()
        .filter_map(|event| to_sse(&event).map(Ok::<Event, Infallible>));

    (
        [
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (
                HeaderName::from_static("x-accel-buffering"),
                HeaderValue::from_static("no"),
            ),
        ],
        Sse::new(events).keep_alive(default_keep_alive()),
    )
}

fn to_sse(event: &StreamEvent) -> Option<Event> {
    match event.to_data() {
        Ok(data) => Some(Event::default().event(event.name()).data(data)),
        Err(e) => {
            warn!(event = event.name(), error = %e, "Failed to encode stream event");
            None
        }
    }
}

fn default_keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(15))
        .text("keep-alive")
}
