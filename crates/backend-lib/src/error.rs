// ============================
// crates/backend-lib/src/error.rs
// ============================
//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use spaceqa_common::ServerEvent;
use thiserror::Error;

/// Application error taxonomy.
///
/// Handshake errors are fatal to the connection attempt; everything else is
/// recoverable and reported to the offending connection only.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("authentication token required")]
    AuthenticationRequired,

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("authenticated user no longer exists")]
    IdentityNotFound,

    #[error("access denied to this room")]
    AccessDenied,

    #[error("{0}")]
    NotAuthorized(&'static str),

    #[error("message content cannot be empty")]
    EmptyContent,

    #[error("message content is too long")]
    ContentTooLong,

    #[error("room not found")]
    RoomNotFound,

    #[error("thread not found")]
    ThreadNotFound,

    #[error("message not found")]
    MessageNotFound,

    #[error("thread is closed")]
    ThreadClosed,

    #[error("store request timed out")]
    StoreUnavailable,

    #[error("store error: {0}")]
    Store(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Wire-level error kind carried in the `error` event.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::AuthenticationRequired => "authentication_required",
            AppError::AuthenticationFailed => "authentication_failed",
            AppError::IdentityNotFound => "identity_not_found",
            AppError::AccessDenied => "access_denied",
            AppError::NotAuthorized(_) => "not_authorized",
            AppError::EmptyContent => "empty_content",
            AppError::ContentTooLong => "content_too_long",
            AppError::RoomNotFound => "room_not_found",
            AppError::ThreadNotFound => "thread_not_found",
            AppError::MessageNotFound => "message_not_found",
            AppError::ThreadClosed => "thread_closed",
            AppError::StoreUnavailable => "store_unavailable",
            AppError::Store(_) | AppError::Internal(_) | AppError::Json(_) => "internal",
        }
    }

    /// Whether this error terminates the connection attempt.
    ///
    /// Only the handshake trio qualifies; every post-handshake failure
    /// leaves the connection open.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::AuthenticationRequired
                | AppError::AuthenticationFailed
                | AppError::IdentityNotFound
        )
    }

    /// HTTP status used when the error surfaces before the upgrade.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthenticationRequired
            | AppError::AuthenticationFailed
            | AppError::IdentityNotFound => StatusCode::UNAUTHORIZED,
            AppError::AccessDenied | AppError::NotAuthorized(_) => StatusCode::FORBIDDEN,
            AppError::RoomNotFound
            | AppError::ThreadNotFound
            | AppError::MessageNotFound => StatusCode::NOT_FOUND,
            AppError::EmptyContent | AppError::ContentTooLong | AppError::ThreadClosed => {
                StatusCode::BAD_REQUEST
            },
            AppError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Store(_) | AppError::Internal(_) | AppError::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    /// Message suitable for the client. Infrastructure details stay in the
    /// logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Store(_) | AppError::Internal(_) | AppError::Json(_) => {
                "an internal server error occurred".to_string()
            },
            other => other.to_string(),
        }
    }

    /// Unicast `error` event for the connection that triggered the failure.
    pub fn to_event(&self) -> ServerEvent {
        ServerEvent::Error {
            kind: self.kind().to_string(),
            message: self.public_message(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "error": {
                "kind": self.kind(),
                "message": self.public_message(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Store(e.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for AppError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        AppError::Internal("failed to queue outbound event".to_string())
    }
}
