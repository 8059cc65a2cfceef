use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use envmon_core::CoreError;
use envmon_supervisor::SupervisorError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Mission not found")]
    MissionNotFound,

    #[error("Export failed: {0}")]
    Export(String),
}

impl From<CoreError> for ApiError {
    fn from(error: CoreError) -> Self {
        ApiError::Supervisor(error.into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Supervisor(SupervisorError::AlreadyRunning { .. }) => StatusCode::CONFLICT,
            ApiError::Supervisor(SupervisorError::NotRunning)
            | ApiError::Supervisor(SupervisorError::MissionNotFound { .. })
            | ApiError::MissionNotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "ok": false, "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let conflict: ApiError = SupervisorError::AlreadyRunning { pid: 7 }.into();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        assert_eq!(conflict.to_string(), "Mission already running (pid=7)");

        let missing: ApiError = SupervisorError::NotRunning.into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.to_string(), "No running mission");

        let timeout: ApiError = SupervisorError::LockTimeout {
            path: "/tmp/x".to_string(),
        }
        .into();
        assert_eq!(timeout.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(
            ApiError::BadRequest("x".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
