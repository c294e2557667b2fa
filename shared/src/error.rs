//! Error taxonomy for the campaign platform.
//!
//! Generalizes the teacher's `SimpleError`/`DbError` pair (one struct for
//! "safe to show the client", one wrapper to keep `DbErr` from leaking) into
//! a single `CoreError` that carries everything a route handler, a webhook
//! consumer and a worker loop all need: a stable `code` for clients, an
//! HTTP status for the API, and an `is_operational` flag so unexpected bugs
//! get logged in full but never echoed back verbatim.

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use http::StatusCode;
use sea_orm::{DbErr, RuntimeErr, SqlxError};
use serde::Serialize;
use validator::ValidationErrors;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Auth,
    Forbidden,
    NotFound,
    Conflict,
    RateLimited,
    Internal,
}

impl ErrorKind {
    fn default_status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::BAD_REQUEST,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// An application error carrying everything needed to answer an HTTP
/// request or decide whether a worker loop should retry.
///
/// `is_operational` mirrors the teacher's distinction between "this is a
/// known, trusted failure mode" and "something we didn't expect broke" —
/// only the former's `message` is safe to put in a response body.
#[derive(Debug, Clone)]
pub struct CoreError {
    pub kind: ErrorKind,
    pub http_status: StatusCode,
    pub code: String,
    pub message: String,
    pub is_operational: bool,
}

impl CoreError {
    pub fn new(kind: ErrorKind, code: &str, message: impl Into<String>) -> CoreError {
        CoreError {
            http_status: kind.default_status(),
            kind,
            code: code.to_owned(),
            message: message.into(),
            is_operational: true,
        }
    }

    pub fn not_found(code: &str, message: impl Into<String>) -> CoreError {
        CoreError::new(ErrorKind::NotFound, code, message)
    }

    pub fn validation(message: impl Into<String>) -> CoreError {
        CoreError::new(ErrorKind::Validation, "VALIDATION_ERROR", message)
    }

    pub fn rate_limited(code: &str) -> CoreError {
        CoreError::new(ErrorKind::RateLimited, code, "rate limit exceeded")
    }

    /// A non-operational error: the message is never surfaced to clients,
    /// only logged, regardless of what it says.
    pub fn internal(message: impl Into<String>) -> CoreError {
        CoreError {
            kind: ErrorKind::Internal,
            http_status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_owned(),
            message: message.into(),
            is_operational: false,
        }
    }

    fn client_message(&self) -> String {
        if self.is_operational {
            self.message.clone()
        } else {
            String::from("internal server error")
        }
    }
}

impl std::fmt::Display for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for CoreError {}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    code: String,
    message: String,
}

/// The response envelope error responses are wrapped in.
#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    success: bool,
    error: ErrorBody,
    timestamp: DateTime<Utc>,
}

impl From<&CoreError> for ErrorEnvelope {
    fn from(err: &CoreError) -> Self {
        ErrorEnvelope {
            success: false,
            error: ErrorBody {
                code: err.code.clone(),
                message: err.client_message(),
            },
            timestamp: Utc::now(),
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        if !self.is_operational {
            tracing::error!(code = %self.code, message = %self.message, "unexpected error");
        }

        let envelope = ErrorEnvelope::from(&self);
        (self.http_status, Json(envelope)).into_response()
    }
}

impl From<ValidationErrors> for CoreError {
    fn from(err: ValidationErrors) -> Self {
        CoreError::validation(err.to_string())
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::internal(err.to_string())
    }
}

impl From<DbErr> for CoreError {
    fn from(err: DbErr) -> Self {
        match err {
            DbErr::RecordNotFound(_) => CoreError::not_found("NOT_FOUND", "entity not found"),
            DbErr::Exec(RuntimeErr::SqlxError(e)) => classify_sqlx_error(e),
            DbErr::Query(RuntimeErr::SqlxError(e)) => classify_sqlx_error(e),
            other => CoreError::internal(other.to_string()),
        }
    }
}

fn classify_sqlx_error(err: SqlxError) -> CoreError {
    match err {
        SqlxError::Database(e) if e.is_unique_violation() => {
            CoreError::new(ErrorKind::Conflict, "DUPLICATE_VALUE", "value already in use")
        }
        other => CoreError::internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_operational_error_redacts_message() {
        let err = CoreError::internal("leaked db connection string");
        let envelope = ErrorEnvelope::from(&err);
        assert_eq!(envelope.error.message, "internal server error");
    }

    #[test]
    fn operational_error_keeps_message() {
        let err = CoreError::not_found("NOT_FOUND", "campaign not found");
        let envelope = ErrorEnvelope::from(&err);
        assert_eq!(envelope.error.message, "campaign not found");
    }

    #[test]
    fn record_not_found_maps_to_404() {
        let err: CoreError = DbErr::RecordNotFound("campaign".into()).into();
        assert_eq!(err.http_status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, "NOT_FOUND");
    }
}
