use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::{DbError, ErrorKind};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unprocessable entity: {0}")]
    Unprocessable(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        if err.is_cancelled() {
            return AppError::Timeout("database query did not complete in time".into());
        }
        let table = err.context().map(|c| c.table).unwrap_or("record");
        match err.kind() {
            Some(ErrorKind::NotFound) => AppError::NotFound(format!("{} not found", table)),
            Some(ErrorKind::UniqueViolation) => {
                AppError::Conflict(format!("{} already exists", table))
            }
            Some(ErrorKind::ForeignKeyViolation) => {
                AppError::Unprocessable(format!("{} references a missing record", table))
            }
            // Driver details stay in the logs.
            Some(ErrorKind::Unclassified) | None => {
                AppError::Internal("database error".into())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
