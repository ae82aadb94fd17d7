//! Session store port.
//!
//! Persistence for sessions, turns and idempotency records.
//!
//! # Atomicity
//!
//! - `save_turn` inserts the turn, updates the session and completes the
//!   request's idempotency record together or not at all.
//! - `reserve_idempotency` is a single conditional insert; two concurrent
//!   retries of one key can never both get `Reserved`.
//! - `time_out_session` re-checks the deadline at write time and only acts on
//!   sessions whose `expires_at` lies more than the grace period in the past.
//!   Callers that run turns in-process hold the session lock around it as well.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::conversation::{
    ConversationSession, ConversationTurn, IdempotencyKey, IdempotencyRecord, Reservation,
};
use crate::domain::foundation::{ErrorCode, SessionId, Timestamp};
use crate::domain::probing::{QuestionStatDelta, QuestionStats};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("session {0} already exists")]
    SessionExists(SessionId),

    #[error("session {0} is closed")]
    SessionClosed(SessionId),

    #[error("turn conflict in session {session_id}: expected turn {expected}, got {actual}")]
    TurnConflict {
        session_id: SessionId,
        expected: u32,
        actual: u32,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            StoreError::SessionExists(_) => ErrorCode::InternalError,
            StoreError::SessionClosed(_) => ErrorCode::SessionClosed,
            StoreError::TurnConflict { .. } => ErrorCode::TurnConflict,
            StoreError::Serialization(_) => ErrorCode::InternalError,
            StoreError::Database(_) => ErrorCode::DatabaseError,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// What a cleanup pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Sessions moved to `Timeout`.
    pub timed_out: Vec<SessionId>,
    /// Idempotency entries removed.
    pub purged_idempotency: usize,
}

impl CleanupReport {
    pub fn is_empty(&self) -> bool {
        self.timed_out.is_empty() && self.purged_idempotency == 0
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persists a freshly created session.
    ///
    /// # Errors
    ///
    /// - `SessionExists` if the id is taken
    async fn create_session(&self, session: &ConversationSession) -> Result<(), StoreError>;

    /// Loads a session. Returns `None` if it does not exist.
    async fn get_session(&self, id: &SessionId) -> Result<Option<ConversationSession>, StoreError>;

    /// Writes session changes that do not add a turn (closing, timing out).
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` if the session does not exist
    /// - `TurnConflict` if the stored turn count differs from the given one
    async fn update_session(&self, session: &ConversationSession) -> Result<(), StoreError>;

    /// Atomically appends `turn` and stores `session` as it stands after it.
    ///
    /// When `completes` is given, the idempotency entry for its key is stored
    /// as completed in the same write, replacing the pending marker.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` if the session does not exist
    /// - `SessionClosed` if the stored session is no longer active
    /// - `TurnConflict` if `turn.turn_number` is not the next number
    async fn save_turn(
        &self,
        session: &ConversationSession,
        turn: &ConversationTurn,
        completes: Option<&IdempotencyRecord>,
    ) -> Result<(), StoreError>;

    /// All turns of a session in ascending order.
    async fn list_turns(&self, id: &SessionId) -> Result<Vec<ConversationTurn>, StoreError>;

    /// Returns the completed, unexpired record for `key`, if any.
    async fn check_idempotency(
        &self,
        key: &IdempotencyKey,
        now: Timestamp,
    ) -> Result<Option<IdempotencyRecord>, StoreError>;

    /// Claims `key` for processing with a pending marker that lapses after
    /// `lease_secs`.
    async fn reserve_idempotency(
        &self,
        key: &IdempotencyKey,
        now: Timestamp,
        lease_secs: u64,
    ) -> Result<Reservation, StoreError>;

    /// Drops a pending marker after a failed request. No-op for completed keys.
    async fn release_idempotency(&self, key: &IdempotencyKey) -> Result<(), StoreError>;

    /// Stored counters of every question that has any.
    async fn load_question_stats(&self) -> Result<Vec<QuestionStats>, StoreError>;

    /// Adds committed per-turn increments to the stored counters.
    async fn record_question_stats(&self, deltas: &[QuestionStatDelta]) -> Result<(), StoreError>;

    /// Ids of active sessions whose deadline passed more than `grace_secs` ago.
    async fn expired_sessions(
        &self,
        now: Timestamp,
        grace_secs: u64,
    ) -> Result<Vec<SessionId>, StoreError>;

    /// Moves one session to `Timeout` if it is still active and still past
    /// its deadline plus `grace_secs`. Returns whether it was timed out.
    async fn time_out_session(
        &self,
        id: &SessionId,
        now: Timestamp,
        grace_secs: u64,
    ) -> Result<bool, StoreError>;

    /// Removes idempotency entries that lapsed by `now`. Returns how many.
    async fn purge_idempotency(&self, now: Timestamp) -> Result<usize, StoreError>;

    /// Times out every expired session and purges lapsed idempotency entries.
    ///
    /// Takes no session locks; [`crate::application::ExpirySweeper`] does the
    /// same work while holding them.
    async fn cleanup_expired(
        &self,
        now: Timestamp,
        grace_secs: u64,
    ) -> Result<CleanupReport, StoreError> {
        let mut report = CleanupReport::default();
        for id in self.expired_sessions(now, grace_secs).await? {
            if self.time_out_session(&id, now, grace_secs).await? {
                report.timed_out.push(id);
            }
        }
        report.purged_idempotency = self.purge_idempotency(now).await?;
        Ok(report)
    }
}

/// True when `session` is active and its deadline passed before `now - grace_secs`.
pub fn is_sweepable(session: &ConversationSession, now: Timestamp, grace_secs: u64) -> bool {
    session.is_active() && session.expires_at().is_before(&now.minus_secs(grace_secs))
}
