use serde_json::json;
use std::fmt::Display;

use anyhow::Error as anyhowError;
use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

use crate::store::StoreError;

/// Failures of the chat core. Every variant is local to one operation and
/// leaves previously committed state untouched.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Missing ids or content. Declined without any state change and never
    /// shown to the user.
    #[error("Declined: {0}")]
    Declined(&'static str),

    #[error("You appear to be offline; reconnect and try again")]
    Offline,

    #[error("Chat not found")]
    ChatNotFound,

    #[error("You are not a participant of this chat")]
    NotParticipant,

    #[error("This chat has already ended")]
    ChatEnded,

    #[error("Friend request not found")]
    RequestNotFound,

    #[error("Cannot accept a request not sent to you")]
    NotAddressedToYou,

    #[error("Friend request already actioned")]
    AlreadyActioned,

    #[error("Cannot reject a request not involving you")]
    NotInvolved,

    #[error("Attachment upload failed: {0}")]
    Blob(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug)]
pub enum AppError {
    // 204 silently declined
    Declined(anyhowError),
    // 400 bad request
    BadRequest(anyhowError),
    // 401 unauthorized
    Unauthorized(anyhowError),
    // 403 forbidden
    Forbidden(anyhowError),
    // 404 not found
    NotFound(anyhowError),
    // 409 conflict
    Conflict(anyhowError),
    // 500 internal server error
    InternalServerError(anyhowError),
    // 503 service unavailable
    ServiceUnavailable(anyhowError),
}

impl Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Declined(e) => write!(f, "Declined: {}", e),
            AppError::BadRequest(e) => write!(f, "BadRequest: {}", e),
            AppError::Unauthorized(e) => write!(f, "Unauthorized: {}", e),
            AppError::Forbidden(e) => write!(f, "Forbidden: {}", e),
            AppError::NotFound(e) => write!(f, "NotFound: {}", e),
            AppError::Conflict(e) => write!(f, "Conflict: {}", e),
            AppError::InternalServerError(e) => write!(f, "InternalServerError: {}", e),
            AppError::ServiceUnavailable(e) => write!(f, "ServiceUnavailable: {}", e),
        }
    }
}

impl From<anyhowError> for AppError {
    fn from(e: anyhowError) -> Self {
        AppError::InternalServerError(e)
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::from(ChatError::Store(e))
    }
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::Declined(_) => AppError::Declined(e.into()),
            ChatError::Offline => AppError::ServiceUnavailable(e.into()),
            ChatError::ChatNotFound | ChatError::RequestNotFound => AppError::NotFound(e.into()),
            ChatError::NotParticipant | ChatError::NotAddressedToYou | ChatError::NotInvolved => {
                AppError::Forbidden(e.into())
            }
            ChatError::ChatEnded | ChatError::AlreadyActioned => AppError::Conflict(e.into()),
            ChatError::Store(StoreError::RetriesExhausted { .. }) => {
                AppError::ServiceUnavailable(e.into())
            }
            ChatError::Blob(_) | ChatError::Store(_) => AppError::InternalServerError(e.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_message) = match &self {
            Self::Declined(err) => {
                tracing::debug!(reason = %err, "Request declined");
                return StatusCode::NO_CONTENT.into_response();
            }
            Self::BadRequest(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Self::Unauthorized(err) => (StatusCode::UNAUTHORIZED, err.to_string()),
            Self::Forbidden(err) => (StatusCode::FORBIDDEN, err.to_string()),
            Self::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string()),
            Self::Conflict(err) => (StatusCode::CONFLICT, err.to_string()),
            Self::InternalServerError(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            Self::ServiceUnavailable(err) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        };

        #[cfg(debug_assertions)]
        let error_response = json!({
            "error": {
                "message": error_message,
                "type": format!("{:?}", self),
            }
        });

        #[cfg(not(debug_assertions))]
        let error_response = json!({
            "error": {
                "message": match status {
                    StatusCode::INTERNAL_SERVER_ERROR => status
                        .canonical_reason()
                        .unwrap_or("An error occurred")
                        .to_string(),
                    _ => error_message,
                },
            }
        });
        (status, axum::Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
