//! Server and API errors

use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use mapster_core::{ConfigError, MapsterError};

/// Startup failures
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to read config {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    ParseConfig(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to open storage: {0}")]
    Core(#[from] MapsterError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned from request handlers
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing, malformed or unknown bearer token
    #[error("Missing or invalid credentials")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Core(#[from] MapsterError),

    /// Blocking task failed to complete
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Core(MapsterError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Core(MapsterError::Forbidden { .. }) => StatusCode::FORBIDDEN,
            ApiError::Core(MapsterError::InvariantViolation(_)) => StatusCode::CONFLICT,
            ApiError::Core(MapsterError::Storage(_)) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::warn!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
