//! Mapping errors to HTTP responses.
//!
//! # Responsibilities
//! - Classify an [`Error`] into status, machine-readable code and message
//! - Log the full error for operators
//! - Write a JSON body that never carries internal detail

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::{Error, ErrorKind};

/// JSON body written for every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code: String,
}

/// Wire-level view of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl Classification {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

/// Determine the status, code and client-facing message for `err`.
pub fn classify(err: &Error) -> Classification {
    match err.kind() {
        ErrorKind::Validation => Classification::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.client_message()),
        ErrorKind::NotFound => Classification::new(StatusCode::NOT_FOUND, "NOT_FOUND", err.client_message()),
        ErrorKind::AlreadyExists => Classification::new(StatusCode::CONFLICT, "CONFLICT", err.client_message()),
        ErrorKind::InvalidInput => Classification::new(StatusCode::BAD_REQUEST, "INVALID_INPUT", err.client_message()),
        ErrorKind::BusinessRule => {
            Classification::new(StatusCode::BAD_REQUEST, "BUSINESS_RULE_VIOLATION", err.client_message())
        }
        ErrorKind::Unauthorized => {
            Classification::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Authentication required")
        }
        ErrorKind::Forbidden => Classification::new(StatusCode::FORBIDDEN, "FORBIDDEN", "Access denied"),
        // Don't leak internal details to the client.
        _ => Classification::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "An internal error occurred",
        ),
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let Classification { status, code, message } = classify(&self);

        // Emitted inside the request span, which carries method and URI.
        tracing::error!(
            status = status.as_u16(),
            code,
            error = %self,
            "request failed"
        );

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}
