//! PostgreSQL implementation of SessionStore.
//!
//! Turns are written in one transaction together with the session row, which
//! is locked with `FOR UPDATE` first, and with the completed idempotency
//! record when the request carried a key. Reservations rely on
//! `INSERT ... ON CONFLICT` so a key is claimed by exactly one caller.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::conversation::{
    ConversationSession, ConversationTurn, EndReason, IdempotencyKey, IdempotencyRecord,
    Reservation, SessionContext,
};
use crate::domain::dialogue::DialogueState;
use crate::domain::emotion::Mood;
use crate::domain::foundation::{QuestionId, SessionId, Timestamp, UserId};
use crate::domain::probing::{QuestionStatDelta, QuestionStats};
use crate::ports::{is_sweepable, SessionStore, StoreError};

/// Embedded schema migrations.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const SESSION_COLUMNS: &str = r#"
    id, user_id, state, created_at, last_activity_at, expires_at, ended_at,
    turn_count, max_turns, inactivity_timeout_secs, final_mood, final_intensity,
    final_confidence, context_json, is_active, end_reason, client_info_json
"#;

/// PostgreSQL implementation of SessionStore.
#[derive(Clone)]
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    /// Creates a new PostgresSessionStore.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies pending migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to run migrations: {}", e)))
    }
}

fn db_err(action: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |e| StoreError::Database(format!("Failed to {}: {}", action, e))
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    async fn create_session(&self, session: &ConversationSession) -> Result<(), StoreError> {
        let context_json = serde_json::to_string(session.context())?;
        let client_info_json = serde_json::to_string(session.client_info())?;

        let result = sqlx::query(
            r#"
            INSERT INTO dialogue_sessions (
                id, user_id, state, created_at, last_activity_at, expires_at, ended_at,
                turn_count, max_turns, inactivity_timeout_secs, final_mood, final_intensity,
                final_confidence, context_json, is_active, end_reason, client_info_json
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(session.id().as_uuid())
        .bind(session.user_id().as_str())
        .bind(session.state().as_str())
        .bind(session.created_at().as_datetime())
        .bind(session.last_activity_at().as_datetime())
        .bind(session.expires_at().as_datetime())
        .bind(session.ended_at().map(|t| *t.as_datetime()))
        .bind(session.turn_count() as i32)
        .bind(session.max_turns() as i32)
        .bind(session.inactivity_timeout_secs() as i64)
        .bind(session.final_mood().map(|m| m.as_str()))
        .bind(session.final_intensity())
        .bind(session.final_confidence())
        .bind(context_json)
        .bind(session.is_active())
        .bind(session.end_reason().map(|r| r.as_str()))
        .bind(client_info_json)
        .execute(&self.pool)
        .await
        .map_err(db_err("insert session"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::SessionExists(*session.id()));
        }
        Ok(())
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<ConversationSession>, StoreError> {
        let query = format!("SELECT {} FROM dialogue_sessions WHERE id = $1", SESSION_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("fetch session"))?;

        row.map(|row| row_to_session(&row)).transpose()
    }

    async fn update_session(&self, session: &ConversationSession) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err("start transaction"))?;

        let stored: Option<(i32,)> =
            sqlx::query_as("SELECT turn_count FROM dialogue_sessions WHERE id = $1 FOR UPDATE")
                .bind(session.id().as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err("lock session"))?;

        let (stored_turns,) = stored.ok_or(StoreError::SessionNotFound(*session.id()))?;
        if stored_turns as u32 != session.turn_count() {
            return Err(StoreError::TurnConflict {
                session_id: *session.id(),
                expected: stored_turns as u32,
                actual: session.turn_count(),
            });
        }

        write_session(&mut tx, session).await?;
        tx.commit().await.map_err(db_err("commit transaction"))?;
        Ok(())
    }

    async fn save_turn(
        &self,
        session: &ConversationSession,
        turn: &ConversationTurn,
        completes: Option<&IdempotencyRecord>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err("start transaction"))?;

        let stored: Option<(i32, bool)> = sqlx::query_as(
            "SELECT turn_count, is_active FROM dialogue_sessions WHERE id = $1 FOR UPDATE",
        )
        .bind(session.id().as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err("lock session"))?;

        let (stored_turns, is_active) =
            stored.ok_or(StoreError::SessionNotFound(*session.id()))?;
        if !is_active {
            return Err(StoreError::SessionClosed(*session.id()));
        }

        let expected = stored_turns as u32 + 1;
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

        let inserted = sqlx::query(
            r#"
            INSERT INTO dialogue_turns (
                session_id, turn_number, state_before, state_after, intent,
                clarity_after, created_at, turn_json
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (session_id, turn_number) DO NOTHING
            "#,
        )
        .bind(session.id().as_uuid())
        .bind(turn.turn_number as i32)
        .bind(turn.state_before.as_str())
        .bind(turn.state_after.as_str())
        .bind(turn.intent.as_str())
        .bind(turn.clarity_after)
        .bind(turn.created_at.as_datetime())
        .bind(serde_json::to_string(turn)?)
        .execute(&mut *tx)
        .await
        .map_err(db_err("insert turn"))?;

        if inserted.rows_affected() == 0 {
            return Err(StoreError::TurnConflict {
                session_id: *session.id(),
                expected,
                actual: turn.turn_number,
            });
        }

        write_session(&mut tx, session).await?;
        if let Some(record) = completes {
            complete_idempotency(&mut tx, record).await?;
        }
        tx.commit().await.map_err(db_err("commit transaction"))?;
        Ok(())
    }

    async fn list_turns(&self, id: &SessionId) -> Result<Vec<ConversationTurn>, StoreError> {
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM dialogue_sessions WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("fetch session"))?;
        if exists.is_none() {
            return Err(StoreError::SessionNotFound(*id));
        }

        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT turn_json FROM dialogue_turns WHERE session_id = $1 ORDER BY turn_number",
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("fetch turns"))?;

        rows.into_iter()
            .map(|(json,)| serde_json::from_str(&json).map_err(StoreError::from))
            .collect()
    }

    async fn check_idempotency(
        &self,
        key: &IdempotencyKey,
        now: Timestamp,
    ) -> Result<Option<IdempotencyRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT key, session_id, turn_number, response, created_at, expires_at
            FROM idempotency_records
            WHERE key = $1 AND status = 'completed' AND expires_at > $2
            "#,
        )
        .bind(key.as_str())
        .bind(now.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("fetch idempotency record"))?;

        row.map(|row| row_to_record(&row)).transpose()
    }

    async fn reserve_idempotency(
        &self,
        key: &IdempotencyKey,
        now: Timestamp,
        lease_secs: u64,
    ) -> Result<Reservation, StoreError> {
        // Claims a new key, or takes over one whose entry has lapsed.
        let claimed = sqlx::query(
            r#"
            INSERT INTO idempotency_records (key, status, created_at, expires_at)
            VALUES ($1, 'pending', $2, $3)
            ON CONFLICT (key) DO UPDATE SET
                status = 'pending',
                session_id = NULL,
                turn_number = NULL,
                response = NULL,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            WHERE idempotency_records.expires_at <= EXCLUDED.created_at
            RETURNING key
            "#,
        )
        .bind(key.as_str())
        .bind(now.as_datetime())
        .bind(now.plus_secs(lease_secs).as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("reserve idempotency key"))?;

        if claimed.is_some() {
            return Ok(Reservation::Reserved);
        }

        let row = sqlx::query(
            r#"
            SELECT key, status, session_id, turn_number, response, created_at, expires_at
            FROM idempotency_records
            WHERE key = $1
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("fetch idempotency record"))?;

        match row {
            Some(row) => {
                let status: String = row.try_get("status").map_err(db_err("read status"))?;
                if status == "completed" {
                    Ok(Reservation::Completed(row_to_record(&row)?))
                } else {
                    Ok(Reservation::Pending)
                }
            }
            // Purged between the two statements; the caller may retry.
            None => Ok(Reservation::Pending),
        }
    }

    async fn release_idempotency(&self, key: &IdempotencyKey) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM idempotency_records WHERE key = $1 AND status = 'pending'")
            .bind(key.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err("release idempotency key"))?;
        Ok(())
    }

    async fn load_question_stats(&self) -> Result<Vec<QuestionStats>, StoreError> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            "SELECT question_id, usage_count, success_count FROM probing_question_stats ORDER BY question_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("fetch question stats"))?;

        rows.into_iter()
            .map(|(id, usage, success)| -> Result<QuestionStats, StoreError> {
                Ok(QuestionStats {
                    question_id: QuestionId::new(id)
                        .map_err(|e| StoreError::Serialization(e.to_string()))?,
                    usage_count: usage.max(0) as u64,
                    success_count: success.max(0) as u64,
                })
            })
            .collect()
    }

    async fn record_question_stats(&self, deltas: &[QuestionStatDelta]) -> Result<(), StoreError> {
        if deltas.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(db_err("start transaction"))?;
        for delta in deltas {
            sqlx::query(
                r#"
                INSERT INTO probing_question_stats (question_id, usage_count, success_count, updated_at)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (question_id) DO UPDATE SET
                    usage_count = probing_question_stats.usage_count + EXCLUDED.usage_count,
                    success_count = probing_question_stats.success_count + EXCLUDED.success_count,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(delta.question_id.as_str())
            .bind(delta.used as i64)
            .bind(delta.succeeded as i64)
            .execute(&mut *tx)
            .await
            .map_err(db_err("update question stats"))?;
        }
        tx.commit().await.map_err(db_err("commit transaction"))?;
        Ok(())
    }

    async fn expired_sessions(
        &self,
        now: Timestamp,
        grace_secs: u64,
    ) -> Result<Vec<SessionId>, StoreError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM dialogue_sessions WHERE is_active AND expires_at < $1 ORDER BY expires_at",
        )
        .bind(now.minus_secs(grace_secs).as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("select expired sessions"))?;

        Ok(rows.into_iter().map(|(id,)| SessionId::from_uuid(id)).collect())
    }

    async fn time_out_session(
        &self,
        id: &SessionId,
        now: Timestamp,
        grace_secs: u64,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err("start transaction"))?;

        // Waits for a concurrent save_turn, then judges the committed row.
        let query = format!("SELECT {} FROM dialogue_sessions WHERE id = $1 FOR UPDATE", SESSION_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err("lock session"))?
            .ok_or(StoreError::SessionNotFound(*id))?;

        let mut session = row_to_session(&row)?;
        if !is_sweepable(&session, now, grace_secs) {
            return Ok(false);
        }
        if let Err(error) = session.time_out(now) {
            tracing::warn!(session_id = %id, %error, "could not time out session");
            return Ok(false);
        }

        write_session(&mut tx, &session).await?;
        tx.commit().await.map_err(db_err("commit transaction"))?;
        Ok(true)
    }

    async fn purge_idempotency(&self, now: Timestamp) -> Result<usize, StoreError> {
        let purged = sqlx::query("DELETE FROM idempotency_records WHERE expires_at <= $1")
            .bind(now.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(db_err("purge idempotency records"))?;
        Ok(purged.rows_affected() as usize)
    }
}

async fn write_session(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    session: &ConversationSession,
) -> Result<(), StoreError> {
    let context_json = serde_json::to_string(session.context())?;

    sqlx::query(
        r#"
        UPDATE dialogue_sessions SET
            state = $2,
            last_activity_at = $3,
            expires_at = $4,
            ended_at = $5,
            turn_count = $6,
            final_mood = $7,
            final_intensity = $8,
            final_confidence = $9,
            context_json = $10,
            is_active = $11,
            end_reason = $12
        WHERE id = $1
        "#,
    )
    .bind(session.id().as_uuid())
    .bind(session.state().as_str())
    .bind(session.last_activity_at().as_datetime())
    .bind(session.expires_at().as_datetime())
    .bind(session.ended_at().map(|t| *t.as_datetime()))
    .bind(session.turn_count() as i32)
    .bind(session.final_mood().map(|m| m.as_str()))
    .bind(session.final_intensity())
    .bind(session.final_confidence())
    .bind(context_json)
    .bind(session.is_active())
    .bind(session.end_reason().map(|r| r.as_str()))
    .execute(&mut **tx)
    .await
    .map_err(db_err("update session"))?;

    Ok(())
}

async fn complete_idempotency(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    record: &IdempotencyRecord,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO idempotency_records (
            key, status, session_id, turn_number, response, created_at, expires_at
        ) VALUES ($1, 'completed', $2, $3, $4, $5, $6)
        ON CONFLICT (key) DO UPDATE SET
            status = 'completed',
            session_id = EXCLUDED.session_id,
            turn_number = EXCLUDED.turn_number,
            response = EXCLUDED.response,
            created_at = EXCLUDED.created_at,
            expires_at = EXCLUDED.expires_at
        "#,
    )
    .bind(record.key.as_str())
    .bind(record.session_id.as_uuid())
    .bind(record.turn_number as i32)
    .bind(&record.response)
    .bind(record.created_at.as_datetime())
    .bind(record.expires_at.as_datetime())
    .execute(&mut **tx)
    .await
    .map_err(db_err("record idempotency result"))?;

    Ok(())
}

fn row_to_session(row: &PgRow) -> Result<ConversationSession, StoreError> {
    let read = db_err("read session row");

    let id: Uuid = row.try_get("id").map_err(&read)?;
    let user_id: String = row.try_get("user_id").map_err(&read)?;
    let state: String = row.try_get("state").map_err(&read)?;
    let created_at: chrono::DateTime<chrono::Utc> = row.try_get("created_at").map_err(&read)?;
    let last_activity_at: chrono::DateTime<chrono::Utc> =
        row.try_get("last_activity_at").map_err(&read)?;
    let expires_at: chrono::DateTime<chrono::Utc> = row.try_get("expires_at").map_err(&read)?;
    let ended_at: Option<chrono::DateTime<chrono::Utc>> =
        row.try_get("ended_at").map_err(&read)?;
    let turn_count: i32 = row.try_get("turn_count").map_err(&read)?;
    let max_turns: i32 = row.try_get("max_turns").map_err(&read)?;
    let timeout_secs: i64 = row.try_get("inactivity_timeout_secs").map_err(&read)?;
    let final_mood: Option<String> = row.try_get("final_mood").map_err(&read)?;
    let final_intensity: Option<f64> = row.try_get("final_intensity").map_err(&read)?;
    let final_confidence: Option<f64> = row.try_get("final_confidence").map_err(&read)?;
    let context_json: String = row.try_get("context_json").map_err(&read)?;
    let is_active: bool = row.try_get("is_active").map_err(&read)?;
    let end_reason: Option<String> = row.try_get("end_reason").map_err(&read)?;
    let client_info_json: String = row.try_get("client_info_json").map_err(&read)?;

    let user_id = UserId::new(user_id).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let state =
        DialogueState::from_str(&state).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let end_reason = end_reason
        .map(|r| EndReason::from_str(&r))
        .transpose()
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let context: SessionContext = serde_json::from_str(&context_json)?;
    let client_info: BTreeMap<String, String> = serde_json::from_str(&client_info_json)?;

    Ok(ConversationSession::reconstitute(
        SessionId::from_uuid(id),
        user_id,
        state,
        Timestamp::from_datetime(created_at),
        Timestamp::from_datetime(last_activity_at),
        Timestamp::from_datetime(expires_at),
        ended_at.map(Timestamp::from_datetime),
        turn_count as u32,
        max_turns as u32,
        timeout_secs as u64,
        final_mood.map(|m| Mood::from_str(&m).unwrap_or_default()),
        final_intensity,
        final_confidence,
        context,
        is_active,
        end_reason,
        client_info,
    ))
}

fn row_to_record(row: &PgRow) -> Result<IdempotencyRecord, StoreError> {
    let read = db_err("read idempotency row");

    let key: String = row.try_get("key").map_err(&read)?;
    let session_id: Option<Uuid> = row.try_get("session_id").map_err(&read)?;
    let turn_number: Option<i32> = row.try_get("turn_number").map_err(&read)?;
    let response: Option<String> = row.try_get("response").map_err(&read)?;
    let created_at: chrono::DateTime<chrono::Utc> = row.try_get("created_at").map_err(&read)?;
    let expires_at: chrono::DateTime<chrono::Utc> = row.try_get("expires_at").map_err(&read)?;

    let incomplete = || StoreError::Serialization(format!("idempotency record '{}' is incomplete", key));
    Ok(IdempotencyRecord {
        key: IdempotencyKey::new(key.clone()).map_err(|e| StoreError::Serialization(e.to_string()))?,
        session_id: SessionId::from_uuid(session_id.ok_or_else(incomplete)?),
        turn_number: turn_number.ok_or_else(incomplete)? as u32,
        response: response.ok_or_else(incomplete)?,
        created_at: Timestamp::from_datetime(created_at),
        expires_at: Timestamp::from_datetime(expires_at),
    })
}
