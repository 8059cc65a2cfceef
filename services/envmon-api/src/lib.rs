//! HTTP control surface for the envmon field device.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

pub mod error;
pub mod export;
pub mod handlers;
pub mod state;
pub mod stream;

pub use error::ApiError;
pub use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/info", get(handlers::device_info))
        .route("/status", get(handlers::status))
        .route("/missions", get(handlers::list_missions))
        .route("/missions/start", post(handlers::start_mission))
        .route("/missions/stop", post(handlers::stop_mission))
        .route("/missions/abort", post(handlers::abort_mission))
        .route("/missions/:mission_id/export", get(export::export_mission))
        .route("/stream", get(stream::event_stream))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
}
