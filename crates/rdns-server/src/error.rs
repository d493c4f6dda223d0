//! HTTP error types for the RDNS server.
//!
//! Maps [`EngineError`] into HTTP status codes. The one quirk this policy
//! carries — `GET` of an absent Name returns 200
//! with empty `data` and the error text in `msg` rather than 404 — is
//! handled at the call site in `routes::domain::get_domain`, not here,
//! since it changes the response shape rather than just the status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use rdns_core::EngineError;
use rdns_storage::DriverError;

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Requested Name, Token, or leaf absent.
    NotFound(String),
    /// Bearer token missing, malformed, or not matching the stored origin.
    Unauthorized(String),
    /// Caller-supplied FQDN, host list, or TTL failed validation.
    BadRequest(String),
    /// Every slug candidate in the retry budget collided.
    GenerationExhausted,
    /// Driver timed out, lost connectivity, or failed for any other reason.
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    status: u16,
    msg: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Unauthorized(msg) => (StatusCode::FORBIDDEN, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::GenerationExhausted => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "exhausted slug generation attempts".to_owned(),
            ),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = ErrorBody {
            status: status.as_u16(),
            msg,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound => Self::NotFound(err.to_string()),
            EngineError::Exists => Self::BadRequest(err.to_string()),
            EngineError::GenerationExhausted => Self::GenerationExhausted,
            EngineError::ValidationFailed(_) => Self::BadRequest(err.to_string()),
            EngineError::Unauthorized => Self::Unauthorized(err.to_string()),
            EngineError::Driver(ref inner) => match inner {
                DriverError::NotFound => Self::NotFound(err.to_string()),
                DriverError::Exists => Self::BadRequest(err.to_string()),
                DriverError::Validation { .. } => Self::BadRequest(err.to_string()),
                DriverError::BackendUnavailable { .. }
                | DriverError::Timeout
                | DriverError::Internal { .. } => Self::Internal(err.to_string()),
            },
            EngineError::Internal(_) => Self::Internal(err.to_string()),
        }
    }
}
