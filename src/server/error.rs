use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

use crate::error::PharmyrusError;

/// Handler-side wrapper mapping `PharmyrusError` onto HTTP statuses.
#[derive(Debug)]
pub struct ApiError(pub PharmyrusError);

impl From<PharmyrusError> for ApiError {
    fn from(err: PharmyrusError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(PharmyrusError::InvalidArgument(format!(
            "invalid request body: {}",
            rejection.body_text()
        )))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    timestamp: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            PharmyrusError::NotFound { .. } => StatusCode::NOT_FOUND,
            PharmyrusError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            PharmyrusError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            err if err.is_upstream() => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), "search failed: {}", self.0);
        } else {
            warn!(status = status.as_u16(), "search rejected: {}", self.0);
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            timestamp: crate::pipeline::aggregate::timestamp_now(),
        };
        (status, Json(body)).into_response()
    }
}
