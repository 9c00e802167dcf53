//! Error types.
//!
//! Two families live here. [`Error`] surfaces infrastructure failures: binding
//! a port, reading configuration. [`HttpError`] is an application-level
//! failure that already knows which status it maps to; resolvers and handlers
//! return it and the framework renders it as a JSON error body.

use http::StatusCode;
use serde::Serialize;
use tracing::error;

use crate::response::{IntoResponse, Response};

/// The error type returned by restkit's fallible infrastructure operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    Addr(String),

    #[error("config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("config: `{key}` has invalid value `{value}`")]
    Env { key: &'static str, value: String },
}

/// A failure that maps directly onto an HTTP response.
///
/// Rendered as `{"status": <code>, "message": "<text>"}` with
/// `application/json`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{status}: {message}")]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn message(&self) -> &str { &self.message }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: u16,
    message: &'a str,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = ErrorBody { status: self.status.as_u16(), message: &self.message };
        // Serializing a u16 and a str cannot fail.
        let bytes = serde_json::to_vec(&body).unwrap_or_default();
        Response::builder().status(self.status).json(bytes)
    }
}

/// Builds a `500 Internal Server Error` and logs the cause.
///
/// Use for failures that indicate a programming or wiring mistake (a route
/// declaring a parameter its path does not have, a missing auth handler)
/// rather than a bad request.
pub fn fatal(message: impl Into<String>) -> HttpError {
    let message = message.into();
    error!(%message, "fatal request error");
    HttpError::internal(message)
}
