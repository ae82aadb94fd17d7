//! Errors surfaced by the conversation manager.

use thiserror::Error;

use crate::domain::conversation::{IdempotencyKey, SessionError};
use crate::domain::foundation::{ErrorCode, SessionId, ValidationError};
use crate::ports::StoreError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversationError {
    /// Malformed request; nothing was created or changed.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("session {0} is closed")]
    SessionClosed(SessionId),

    #[error("session {0} has no final mood yet")]
    SessionNotConcluded(SessionId),

    /// Another turn was stored first; retry the request.
    #[error("turn conflict in session {session_id}: expected turn {expected}, got {actual}")]
    TurnConflict {
        session_id: SessionId,
        expected: u32,
        actual: u32,
    },

    /// A request with the same idempotency key is still being processed.
    #[error("request {0} is already in flight")]
    RequestInFlight(IdempotencyKey),

    #[error("storage error: {0}")]
    Store(StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ConversationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ConversationError::Validation(_) => ErrorCode::ValidationFailed,
            ConversationError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            ConversationError::SessionClosed(_) => ErrorCode::SessionClosed,
            ConversationError::SessionNotConcluded(_) => ErrorCode::SessionNotConcluded,
            ConversationError::TurnConflict { .. } => ErrorCode::TurnConflict,
            ConversationError::RequestInFlight(_) => ErrorCode::RequestInFlight,
            ConversationError::Store(err) => err.code(),
            ConversationError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// True when repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConversationError::TurnConflict { .. } | ConversationError::RequestInFlight(_)
        )
    }
}

impl From<StoreError> for ConversationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SessionNotFound(id) => ConversationError::SessionNotFound(id),
            StoreError::SessionClosed(id) => ConversationError::SessionClosed(id),
            StoreError::TurnConflict {
                session_id,
                expected,
                actual,
            } => ConversationError::TurnConflict {
                session_id,
                expected,
                actual,
            },
            other => ConversationError::Store(other),
        }
    }
}

impl From<SessionError> for ConversationError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Closed(id) => ConversationError::SessionClosed(id),
            SessionError::TurnLimitReached { id, .. } => ConversationError::SessionClosed(id),
            SessionError::InvalidTransition(e) => ConversationError::Internal(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConversationError {
    fn from(err: serde_json::Error) -> Self {
        ConversationError::Internal(format!("serialization failed: {}", err))
    }
}
