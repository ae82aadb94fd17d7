//! In-Memory Session Store Adapter
//!
//! Keeps sessions, turns and idempotency entries in memory behind one lock,
//! so every multi-part write is a single critical section.
//! Useful for testing, development and the console binary.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::conversation::{
    ConversationSession, ConversationTurn, IdempotencyKey, IdempotencyRecord, Reservation,
};
use crate::domain::foundation::{QuestionId, SessionId, Timestamp};
use crate::domain::probing::{QuestionStatDelta, QuestionStats};
use crate::ports::{is_sweepable, SessionStore, StoreError};

#[derive(Debug, Clone)]
enum IdempotencyEntry {
    Pending { expires_at: Timestamp },
    Completed(IdempotencyRecord),
}

impl IdempotencyEntry {
    fn is_expired_at(&self, now: &Timestamp) -> bool {
        match self {
            IdempotencyEntry::Pending { expires_at } => !now.is_before(expires_at),
            IdempotencyEntry::Completed(record) => record.is_expired_at(now),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<SessionId, ConversationSession>,
    turns: HashMap<SessionId, Vec<ConversationTurn>>,
    idempotency: HashMap<IdempotencyKey, IdempotencyEntry>,
    question_stats: HashMap<QuestionId, QuestionStats>,
}

/// In-memory session store
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all stored data (useful for tests)
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.sessions.clear();
        inner.turns.clear();
        inner.idempotency.clear();
        inner.question_stats.clear();
    }

    /// Number of stored sessions
    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    /// Number of stored turns across all sessions
    pub async fn turn_count(&self) -> usize {
        self.inner.read().await.turns.values().map(Vec::len).sum()
    }

    /// Number of idempotency entries, pending or completed
    pub async fn idempotency_count(&self) -> usize {
        self.inner.read().await.idempotency.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, session: &ConversationSession) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.sessions.contains_key(session.id()) {
            return Err(StoreError::SessionExists(*session.id()));
        }
        inner.sessions.insert(*session.id(), session.clone());
        inner.turns.insert(*session.id(), Vec::new());
        Ok(())
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<ConversationSession>, StoreError> {
        Ok(self.inner.read().await.sessions.get(id).cloned())
    }

    async fn update_session(&self, session: &ConversationSession) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .sessions
            .get_mut(session.id())
            .ok_or(StoreError::SessionNotFound(*session.id()))?;
        if stored.turn_count() != session.turn_count() {
            return Err(StoreError::TurnConflict {
                session_id: *session.id(),
                expected: stored.turn_count(),
                actual: session.turn_count(),
            });
        }
        *stored = session.clone();
        Ok(())
    }

    async fn save_turn(
        &self,
        session: &ConversationSession,
        turn: &ConversationTurn,
        completes: Option<&IdempotencyRecord>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .sessions
            .get(session.id())
            .ok_or(StoreError::SessionNotFound(*session.id()))?;

        if !stored.is_active() {
            return Err(StoreError::SessionClosed(*session.id()));
        }

        let expected = stored.turn_count() + 1;
        if turn.session_id != *session.id()
            || turn.turn_number != expected
            || session.turn_count() != turn.turn_number
        {
            return Err(StoreError::TurnConflict {
                session_id: *session.id(),
                expected,
                actual: turn.turn_number,
            });
        }

        // All writes happen under the same guard.
        inner.sessions.insert(*session.id(), session.clone());
        inner
            .turns
            .entry(*session.id())
            .or_default()
            .push(turn.clone());
        if let Some(record) = completes {
            inner.idempotency.insert(
                record.key.clone(),
                IdempotencyEntry::Completed(record.clone()),
            );
        }
        Ok(())
    }

    async fn list_turns(&self, id: &SessionId) -> Result<Vec<ConversationTurn>, StoreError> {
        let inner = self.inner.read().await;
        if !inner.sessions.contains_key(id) {
            return Err(StoreError::SessionNotFound(*id));
        }
        Ok(inner.turns.get(id).cloned().unwrap_or_default())
    }

    async fn check_idempotency(
        &self,
        key: &IdempotencyKey,
        now: Timestamp,
    ) -> Result<Option<IdempotencyRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(match inner.idempotency.get(key) {
            Some(IdempotencyEntry::Completed(record)) if !record.is_expired_at(&now) => {
                Some(record.clone())
            }
            _ => None,
        })
    }

    async fn reserve_idempotency(
        &self,
        key: &IdempotencyKey,
        now: Timestamp,
        lease_secs: u64,
    ) -> Result<Reservation, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.idempotency.get(key) {
            Some(entry) if !entry.is_expired_at(&now) => {
                return Ok(match entry {
                    IdempotencyEntry::Pending { .. } => Reservation::Pending,
                    IdempotencyEntry::Completed(record) => Reservation::Completed(record.clone()),
                });
            }
            _ => {}
        }
        inner.idempotency.insert(
            key.clone(),
            IdempotencyEntry::Pending {
                expires_at: now.plus_secs(lease_secs),
            },
        );
        Ok(Reservation::Reserved)
    }

    async fn release_idempotency(&self, key: &IdempotencyKey) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if matches!(inner.idempotency.get(key), Some(IdempotencyEntry::Pending { .. })) {
            inner.idempotency.remove(key);
        }
        Ok(())
    }

    async fn load_question_stats(&self) -> Result<Vec<QuestionStats>, StoreError> {
        let inner = self.inner.read().await;
        let mut stats: Vec<QuestionStats> = inner.question_stats.values().cloned().collect();
        stats.sort_by(|a, b| a.question_id.cmp(&b.question_id));
        Ok(stats)
    }

    async fn record_question_stats(&self, deltas: &[QuestionStatDelta]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for delta in deltas {
            inner
                .question_stats
                .entry(delta.question_id.clone())
                .or_insert_with(|| QuestionStats::new(delta.question_id.clone()))
                .add(delta);
        }
        Ok(())
    }

    async fn expired_sessions(
        &self,
        now: Timestamp,
        grace_secs: u64,
    ) -> Result<Vec<SessionId>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .sessions
            .values()
            .filter(|session| is_sweepable(session, now, grace_secs))
            .map(|session| *session.id())
            .collect())
    }

    async fn time_out_session(
        &self,
        id: &SessionId,
        now: Timestamp,
        grace_secs: u64,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(id)
            .ok_or(StoreError::SessionNotFound(*id))?;
        if !is_sweepable(session, now, grace_secs) {
            return Ok(false);
        }
        match session.time_out(now) {
            Ok(()) => Ok(true),
            Err(error) => {
                tracing::warn!(session_id = %id, %error, "could not time out session");
                Ok(false)
            }
        }
    }

    async fn purge_idempotency(&self, now: Timestamp) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.idempotency.len();
        inner.idempotency.retain(|_, entry| !entry.is_expired_at(&now));
        Ok(before - inner.idempotency.len())
    }
}
