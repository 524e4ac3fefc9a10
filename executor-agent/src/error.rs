use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::models::ExecuteResponse;

/// Reasons an `/execute` request is refused before anything is spawned.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Failed to read request body: {message}")]
    BodyRead { message: String },

    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },

    #[error("No command specified")]
    EmptyCommand,

    #[error("Invalid working directory: must be within {root}, got {requested:?}")]
    WorkingDirOutsideRoot { root: String, requested: String },

    #[error("Invalid working directory: {message}")]
    WorkingDirUnresolvable { message: String },
}

impl RequestError {
    pub fn code(&self) -> &'static str {
        match self {
            RequestError::BodyRead { .. } => "BODY_READ",
            RequestError::InvalidJson { .. } => "INVALID_JSON",
            RequestError::EmptyCommand => "EMPTY_COMMAND",
            RequestError::WorkingDirOutsideRoot { .. } => "WORKING_DIR_OUTSIDE_ROOT",
            RequestError::WorkingDirUnresolvable { .. } => "WORKING_DIR_UNRESOLVABLE",
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        tracing::warn!(code = self.code(), error = %self, "rejected execute request");
        (
            StatusCode::BAD_REQUEST,
            Json(ExecuteResponse::rejected(self.to_string())),
        )
            .into_response()
    }
}
