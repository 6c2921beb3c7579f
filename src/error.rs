use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

use crate::ports::RepositoryError;

/// Validation failure for a single request field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Errors raised while processing an ingested order record.
///
/// Only connectivity-class repository failures are retryable; everything else
/// is deterministic and goes straight to the dead-letter topic.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("invalid order request: {0}")]
    InvalidRequest(ValidationError),

    #[error("duplicate idempotency key: {0}")]
    DuplicateKey(String),

    #[error("repository failure: {0}")]
    Repository(#[from] RepositoryError),
}

impl ProcessingError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ProcessingError::InvalidRequest(_) => false,
            ProcessingError::DuplicateKey(_) => false,
            ProcessingError::Repository(e) => e.is_retryable(),
        }
    }

    /// Short class name carried in dead-letter diagnostic headers.
    pub fn class(&self) -> &'static str {
        match self {
            ProcessingError::InvalidRequest(_) => "InvalidRequest",
            ProcessingError::DuplicateKey(_) => "DuplicateKey",
            ProcessingError::Repository(_) => "RepositoryFailure",
        }
    }
}

/// Errors surfaced by the read-side HTTP API.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(what) => AppError::NotFound(what),
            other => AppError::Storage(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
