//! Server error types.

use std::io;

use axum::http::StatusCode;
use thiserror::Error;

use freebusy_core::{QueryError, TracingError};
use freebusy_google::GoogleError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error (listener, config file).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Authorization or upstream failure.
    #[error(transparent)]
    Google(#[from] GoogleError),

    /// The submitted form could not be turned into a query.
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] QueryError),

    /// Logging could not be initialized.
    #[error(transparent)]
    Tracing(#[from] TracingError),
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// HTTP status used when this error ends a request.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Google(err) => err.message().to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_error_is_500_with_plain_message() {
        let err = ServerError::from(GoogleError::calendar(
            "Invalid calendar ID or no busy intervals found",
        ));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.user_message(),
            "Invalid calendar ID or no busy intervals found"
        );
    }

    #[test]
    fn invalid_input_is_400() {
        let err = ServerError::from(QueryError::MissingCalendarId);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.user_message(), "Invalid input: calendar ID is required");
    }

    #[test]
    fn config_error_display() {
        let err = ServerError::config("bad bind address");
        assert_eq!(err.to_string(), "Configuration error: bad bind address");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
