//! Idempotency keys and cached turn results.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::domain::foundation::{SessionId, Timestamp, ValidationError};

/// Maximum length of a client-supplied key.
pub const MAX_KEY_LENGTH: usize = 255;

/// Token deduplicating retried requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Wraps a client-supplied key.
    pub fn new(key: impl Into<String>) -> Result<Self, ValidationError> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::empty_field("idempotency_key"));
        }
        if trimmed.len() > MAX_KEY_LENGTH {
            return Err(ValidationError::too_long(
                "idempotency_key",
                MAX_KEY_LENGTH,
                trimmed.len(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Derives a key from the conversation scope, the message and the client's
    /// request id.
    ///
    /// `scope` is the session id when the client sent one, otherwise the user id.
    pub fn derive(scope: &str, message: &str, request_id: &str) -> Self {
        let mut hasher = Sha256::new();
        for part in [scope, message.trim(), request_id] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        Self(format!("derived:{}", hex))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The stored result of a completed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: IdempotencyKey,
    pub session_id: SessionId,
    pub turn_number: u32,
    /// Serialized response, returned verbatim on replay.
    pub response: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

impl IdempotencyRecord {
    pub fn new(
        key: IdempotencyKey,
        session_id: SessionId,
        turn_number: u32,
        response: String,
        created_at: Timestamp,
        ttl_secs: u64,
    ) -> Self {
        Self {
            key,
            session_id,
            turn_number,
            response,
            created_at,
            expires_at: created_at.plus_secs(ttl_secs),
        }
    }

    pub fn is_expired_at(&self, now: &Timestamp) -> bool {
        !now.is_before(&self.expires_at)
    }
}

/// Outcome of trying to claim a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// The caller owns the key and must record or release it.
    Reserved,
    /// Another request holds the key and has not finished.
    Pending,
    /// The key already has a result.
    Completed(IdempotencyRecord),
}
