//! `ApiError` is the one error type every intake handler returns: it pairs
//! an HTTP status with a message, and always renders as the uniform
//! `{"error": "<message>"}` body the intake surface promises across all
//! three endpoints.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            error: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl From<relay_sql::StoreError> for ApiError {
    fn from(error: relay_sql::StoreError) -> Self {
        match error {
            relay_sql::StoreError::NotFound(tx_hash) => {
                tracing::debug!(tx_hash, "intake query for unknown job");
                ApiError::not_found("Job not found")
            }
            other => {
                tracing::error!(error = ?other, "store error while serving intake request");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}
