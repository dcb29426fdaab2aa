use axis_protocol::ProblemDetails;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::automation::LaunchError;
use crate::provider::ProviderError;
use crate::status_store::StatusError;

/// Handler failure rendered as an `application/problem+json`-style body.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Launch(LaunchError),
}

impl ApiError {
    pub fn validation(detail: impl Into<String>) -> Self {
        ApiError::Validation(detail.into())
    }

    pub fn manual_only(action: &str) -> Self {
        ApiError::Forbidden(format!("{action} is only allowed in MANUAL mode"))
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Provider(ProviderError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Provider(_) => StatusCode::BAD_GATEWAY,
            ApiError::Launch(LaunchError::EmptyTask) => StatusCode::BAD_REQUEST,
            ApiError::Launch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            ApiError::Validation(_) | ApiError::Launch(LaunchError::EmptyTask) => "Bad Request",
            ApiError::Forbidden(_) => "Forbidden",
            ApiError::Provider(ProviderError::NotFound(_)) => "Not Found",
            ApiError::Provider(_) => "Bad Gateway",
            ApiError::Launch(_) => "Launch Failed",
        }
    }
}

impl From<StatusError> for ApiError {
    fn from(err: StatusError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<LaunchError> for ApiError {
    fn from(err: LaunchError) -> Self {
        ApiError::Launch(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(target: "axis::http", status = status.as_u16(), error = %self, "request failed");
        }
        let body = ProblemDetails::new(status.as_u16(), self.title(), Some(self.to_string()));
        (status, Json(body)).into_response()
    }
}
