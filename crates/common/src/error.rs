//! Error types for tunepoll.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// A poll action the actor is not allowed to perform right now.
///
/// Rejections never mutate state and are reported back to the actor.
/// Repeating the same action yields the same rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("That doesn't look like a Spotify track link")]
    InvalidLink,

    #[error("Only workspace admins can change the poll phase")]
    PermissionDenied,

    #[error("You already submitted a song for this poll")]
    AlreadySubmitted,

    #[error("You already voted in this poll")]
    AlreadyVoted,

    #[error("You have no active submission")]
    NotSubmitted,

    #[error("You haven't voted yet")]
    NotVoted,

    #[error("The poll is not accepting that right now")]
    WrongPhase,

    #[error("That song is not part of this poll")]
    UnknownSong,
}

impl Rejection {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidLink => "INVALID_LINK",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::AlreadySubmitted => "ALREADY_SUBMITTED",
            Self::AlreadyVoted => "ALREADY_VOTED",
            Self::NotSubmitted => "NOT_SUBMITTED",
            Self::NotVoted => "NOT_VOTED",
            Self::WrongPhase => "WRONG_PHASE",
            Self::UnknownSong => "UNKNOWN_SONG",
        }
    }
}

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Client Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Rejected(#[from] Rejection),

    // === Server Errors ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            // 4xx Client Errors
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Rejected(Rejection::PermissionDenied) => StatusCode::FORBIDDEN,
            Self::Rejected(Rejection::InvalidLink) => StatusCode::BAD_REQUEST,
            Self::Rejected(_) => StatusCode::CONFLICT,

            // 5xx Server Errors
            Self::Database(_)
            | Self::Serialization(_)
            | Self::Config(_)
            | Self::ExternalService(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Conflict(_) => "CONFLICT",
            Self::Rejected(rejection) => rejection.code(),
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// The domain rejection carried by this error, if any.
    #[must_use]
    pub const fn rejection(&self) -> Option<Rejection> {
        match self {
            Self::Rejected(rejection) => Some(*rejection),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        if self.is_server_error() {
            tracing::error!(error = %self, code = code, "Server error occurred");
        } else {
            tracing::debug!(error = %self, code = code, "Client error occurred");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

// === From implementations ===

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_are_client_errors() {
        let denied = AppError::from(Rejection::PermissionDenied);
        assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(denied.error_code(), "PERMISSION_DENIED");
        assert!(!denied.is_server_error());

        let voted = AppError::from(Rejection::AlreadyVoted);
        assert_eq!(voted.status_code(), StatusCode::CONFLICT);
        assert_eq!(voted.rejection(), Some(Rejection::AlreadyVoted));
    }

    #[test]
    fn test_rejection_message_is_user_facing() {
        let err = AppError::from(Rejection::InvalidLink);
        assert_eq!(err.to_string(), "That doesn't look like a Spotify track link");
    }

    #[test]
    fn test_store_failures_are_server_errors() {
        assert!(AppError::Database("down".into()).is_server_error());
        assert!(AppError::ExternalService("spotify 503".into()).is_server_error());
        assert_eq!(AppError::Database("down".into()).rejection(), None);
    }
}
