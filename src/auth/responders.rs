//! Failure Responders
//! Mission: Turn authentication and authorization failures into one JSON error shape
//!
//! ```json
//! {"timestamp": "2025-01-01T00:00:00.000Z", "status": 401, "error": "Unauthorized",
//!  "message": "Invalid or expired token", "path": "/api/auth/me"}
//! ```
//!
//! Messages are fixed per failure kind. They never say which token check
//! failed or how long a lockout has left.

use crate::auth::{jwt::AuthError, permission::AccessError, tracker::LoginAttemptError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Kinds of failure the pipeline can report to a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Token malformed, badly signed or expired
    InvalidToken,
    Unauthenticated,
    Forbidden,
    StillLocked,
    InvalidCredentials,
    /// Attempt store unavailable; login refused
    LoginUnavailable,
    BadRequest(&'static str),
    Conflict(&'static str),
    NotFound(&'static str),
    Internal,
}

impl FailureKind {
    pub fn status_code(&self) -> StatusCode {
        match self {
            FailureKind::InvalidToken
            | FailureKind::Unauthenticated
            | FailureKind::InvalidCredentials => StatusCode::UNAUTHORIZED,
            FailureKind::Forbidden => StatusCode::FORBIDDEN,
            FailureKind::StillLocked => StatusCode::LOCKED,
            FailureKind::LoginUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            FailureKind::BadRequest(_) => StatusCode::BAD_REQUEST,
            FailureKind::Conflict(_) => StatusCode::CONFLICT,
            FailureKind::NotFound(_) => StatusCode::NOT_FOUND,
            FailureKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            FailureKind::InvalidToken => "Invalid or expired token",
            FailureKind::Unauthenticated => "Authentication required",
            FailureKind::Forbidden => "Insufficient permissions",
            FailureKind::StillLocked => {
                "Account temporarily locked due to failed login attempts. Try again later"
            }
            FailureKind::InvalidCredentials => "Invalid username or password",
            FailureKind::LoginUnavailable => "Login temporarily unavailable",
            FailureKind::BadRequest(msg) | FailureKind::Conflict(msg) | FailureKind::NotFound(msg) => *msg,
            FailureKind::Internal => "Internal server error",
        }
    }
}

/// Wire-level error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub timestamp: String,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
}

/// Build the error body for `kind` raised on `path` at `now`
pub fn error_body(kind: FailureKind, path: &str, now: DateTime<Utc>) -> ErrorBody {
    let status = kind.status_code();
    ErrorBody {
        timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        status: status.as_u16(),
        error: status.canonical_reason().unwrap_or("Error").to_string(),
        message: kind.message().to_string(),
        path: path.to_string(),
    }
}

/// A failure bound to the request path it occurred on
#[derive(Debug, Clone)]
pub struct FailureResponse {
    pub kind: FailureKind,
    pub path: String,
}

impl FailureResponse {
    pub fn new(kind: FailureKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

impl IntoResponse for FailureResponse {
    fn into_response(self) -> Response {
        let body = error_body(self.kind, &self.path, Utc::now());
        (self.kind.status_code(), Json(body)).into_response()
    }
}

impl From<AuthError> for FailureKind {
    fn from(_: AuthError) -> Self {
        FailureKind::InvalidToken
    }
}

impl From<AccessError> for FailureKind {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Unauthenticated => FailureKind::Unauthenticated,
            AccessError::Forbidden => FailureKind::Forbidden,
        }
    }
}

impl From<LoginAttemptError> for FailureKind {
    fn from(err: LoginAttemptError) -> Self {
        match err {
            LoginAttemptError::StillLocked => FailureKind::StillLocked,
            LoginAttemptError::Storage(e) => {
                error!("Login attempt store failure: {:#}", e);
                FailureKind::LoginUnavailable
            }
        }
    }
}
