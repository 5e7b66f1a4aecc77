//! HTTP error responses.
//!
//! Bridges [`BookingError`] and HTTP: every handler returns
//! `Result<_, AppError>`, and the error body is always
//! `{"code": "...", "message": "..."}`.

use crate::error::BookingError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Attach the underlying error for logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 401 Unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message.into(), "UNAUTHENTICATED".to_string())
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR".to_string(),
        )
    }

    /// HTTP status of the response
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

/// HTTP status for each workflow error
const fn status_of(error: &BookingError) -> StatusCode {
    match error {
        BookingError::InvalidTransition { .. }
        | BookingError::AlreadyApproved
        | BookingError::CapacityExceeded { .. } => StatusCode::CONFLICT,
        BookingError::Forbidden { .. } => StatusCode::FORBIDDEN,
        BookingError::InvalidPercent { .. }
        | BookingError::PaymentVerificationFailed { .. }
        | BookingError::InvalidInput { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        BookingError::NotFound { .. } => StatusCode::NOT_FOUND,
        BookingError::Unauthenticated => StatusCode::UNAUTHORIZED,
        BookingError::Gateway { .. } => StatusCode::BAD_GATEWAY,
        BookingError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<BookingError> for AppError {
    fn from(error: BookingError) -> Self {
        let app = Self::new(status_of(&error), error.to_string(), error.code().to_string());
        if app.status.is_server_error() {
            app.with_source(error.into())
        } else {
            app
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Request failed"
                ),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::Permission;
    use crate::types::{BookingStatus, Role};

    #[test]
    fn workflow_errors_map_to_statuses() {
        let cases = [
            (BookingError::AlreadyApproved, StatusCode::CONFLICT),
            (BookingError::InvalidPercent { percent: 150 }, StatusCode::UNPROCESSABLE_ENTITY),
            (BookingError::verification_failed("bad signature"), StatusCode::UNPROCESSABLE_ENTITY),
            (BookingError::not_found("booking", "x"), StatusCode::NOT_FOUND),
            (BookingError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (
                BookingError::Forbidden {
                    role: Role::User,
                    permission: Permission::DecideAid,
                },
                StatusCode::FORBIDDEN,
            ),
            (
                BookingError::InvalidTransition {
                    status: Some(BookingStatus::Cancelled),
                    event: crate::machine::BookingEvent::Pay,
                },
                StatusCode::CONFLICT,
            ),
            (
                BookingError::Gateway {
                    message: "down".to_string(),
                },
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (error, status) in cases {
            let code = error.code();
            let app = AppError::from(error);
            assert_eq!(app.status(), status);
            assert_eq!(app.code(), code);
        }
    }

    #[test]
    fn server_errors_keep_their_source() {
        let app = AppError::from(BookingError::Unavailable {
            message: "shutting down".to_string(),
        });
        assert!(std::error::Error::source(&app).is_some());
        assert_eq!(app.to_string(), "[UNAVAILABLE] service unavailable: shutting down");
    }

    #[test]
    fn client_errors_have_no_source() {
        let app = AppError::from(BookingError::AlreadyApproved);
        assert!(std::error::Error::source(&app).is_none());
    }
}
