use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use stake_core::api::ApiResponse;
use stake_core::error::StakeError;

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct ApiError(pub StakeError);

impl ApiError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(StakeError::Invalid(msg.into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            StakeError::NotFound(_) => StatusCode::NOT_FOUND,
            StakeError::Unavailable(_) | StakeError::Conflict { .. } => StatusCode::CONFLICT,
            StakeError::Invalid(_) => StatusCode::BAD_REQUEST,
            StakeError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Store failure");
        }
        let body = ApiResponse::<()>::from_error(&self.0);
        (status, Json(body)).into_response()
    }
}

impl From<StakeError> for ApiError {
    fn from(err: StakeError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self(StakeError::Store(format!("store task failed: {}", err)))
    }
}
