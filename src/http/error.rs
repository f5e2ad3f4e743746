use axum::http::StatusCode;
use axum::Json;

use crate::domain::transaction::{ErrorEnvelope, ErrorPayload};
use crate::error::RetryError;

/// Error-kind to transport-status translation. The engine and store know
/// nothing about HTTP; the mapping lives here at the edge.
pub fn status_for(err: &RetryError) -> StatusCode {
    match err {
        RetryError::NotFound(_) => StatusCode::NOT_FOUND,
        RetryError::AlreadyExists(_) => StatusCode::CONFLICT,
        RetryError::Exhausted(_) => StatusCode::CONFLICT,
        RetryError::NotRetryable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        RetryError::ConfigInvalid(_) => StatusCode::BAD_REQUEST,
    }
}

pub fn error_code(err: &RetryError) -> &'static str {
    match err {
        RetryError::NotFound(_) => "NOT_FOUND",
        RetryError::AlreadyExists(_) => "ALREADY_EXISTS",
        RetryError::Exhausted(_) => "ATTEMPTS_EXHAUSTED",
        RetryError::NotRetryable { .. } => "NOT_RETRYABLE",
        RetryError::ConfigInvalid(_) => "CONFIG_INVALID",
    }
}

pub fn error_response(err: RetryError) -> (StatusCode, Json<ErrorEnvelope>) {
    (
        status_for(&err),
        Json(ErrorEnvelope {
            error: ErrorPayload {
                code: error_code(&err).to_string(),
                message: err.to_string(),
                details: None,
            },
        }),
    )
}

pub fn bad_request(code: &str, message: &str) -> (StatusCode, Json<ErrorEnvelope>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorEnvelope {
            error: ErrorPayload {
                code: code.to_string(),
                message: message.to_string(),
                details: None,
            },
        }),
    )
}
