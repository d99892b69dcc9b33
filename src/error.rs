use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// JSON body returned for every error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Errors surfaced by the HTTP handlers
///
/// Validation failures are always reported before any side effect; store
/// and upstream failures are logged once here at the response boundary.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed or missing client input
    #[error("{0}")]
    Validation(String),
    /// Looked-up resource does not exist
    #[error("{0}")]
    NotFound(String),
    /// Required operator configuration is missing
    #[error("{0}")]
    Configuration(String),
    /// Registration store failure
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
    /// External document-storage endpoint failure
    #[error("{0}")]
    Upstream(String),
    /// Anything else
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Configuration(_) | Self::Store(_) | Self::Upstream(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Configuration(_) => "CONFIG_ERROR",
            Self::Store(_) => "STORE_ERROR",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!(code = self.code(), error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        };

        (status, Json(body)).into_response()
    }
}
