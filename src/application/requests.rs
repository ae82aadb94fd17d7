//! Inputs and outputs of the conversation manager.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::conversation::{EmotionalSignals, EndReason, ResponseType, Song};
use crate::domain::dialogue::{ContextSignals, DialogueState, Intent};
use crate::domain::emotion::Mood;
use crate::domain::foundation::{QuestionId, SessionId, Timestamp};

/// Client metadata key carrying the preferred locale.
pub const LOCALE_KEY: &str = "locale";

/// Client metadata key carrying a per-request id, used to derive an
/// idempotency key when none is supplied.
pub const REQUEST_ID_KEY: &str = "request_id";

/// One user message to process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub message: String,
    /// Session to continue. Unknown, malformed or closed ids start a new one.
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// `text`, `voice` or `quick_reply`; defaults to text.
    #[serde(default)]
    pub input_type: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub client_info: BTreeMap<String, String>,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn in_session(mut self, session_id: impl ToString) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_input_type(mut self, input_type: impl Into<String>) -> Self {
        self.input_type = Some(input_type.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_client_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.client_info.insert(key.into(), value.into());
        self
    }
}

/// Result of one processed turn.
///
/// Cached verbatim for idempotent replays, so every field must survive a
/// JSON round trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub session_id: SessionId,
    pub turn_number: u32,
    pub bot_response: String,
    pub response_type: ResponseType,
    pub detected_mood: Option<Mood>,
    pub detected_intensity: Option<f64>,
    pub clarity_score: f64,
    pub current_state: DialogueState,
    pub should_recommend: bool,
    pub processing_time_ms: u64,
    pub intent: Intent,
    pub intent_confidence: f64,
    #[serde(default)]
    pub recommendations: Vec<Song>,
    pub question_id: Option<QuestionId>,
    /// A collaborator failed and a fallback was used.
    pub degraded: bool,
    /// States walked during the turn, starting with the state before it.
    pub state_path: Vec<DialogueState>,
    pub session_ended: bool,
}

/// A session opened through the lifecycle API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStart {
    pub session_id: SessionId,
    pub state: DialogueState,
    pub greeting: Option<String>,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

/// Snapshot of a session and its emotional context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub session_id: SessionId,
    pub user_id: String,
    pub state: DialogueState,
    pub is_active: bool,
    pub turn_count: u32,
    pub max_turns: u32,
    /// Turns found in the store; equals `turn_count` for a consistent session.
    pub turns_recorded: usize,
    pub clarity_score: f64,
    pub emotional: EmotionalSignals,
    pub context_signals: ContextSignals,
    pub final_mood: Option<Mood>,
    pub final_intensity: Option<f64>,
    pub final_confidence: Option<f64>,
    pub end_reason: Option<EndReason>,
    pub created_at: Timestamp,
    pub last_activity_at: Timestamp,
    pub expires_at: Timestamp,
    pub ended_at: Option<Timestamp>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_optional_fields() {
        let request = TurnRequest::new("hi")
            .in_session("abc")
            .for_user("listener")
            .with_input_type("voice")
            .with_idempotency_key("k-1")
            .with_client_info(LOCALE_KEY, "es");
        assert_eq!(request.session_id.as_deref(), Some("abc"));
        assert_eq!(request.user_id.as_deref(), Some("listener"));
        assert_eq!(request.input_type.as_deref(), Some("voice"));
        assert_eq!(request.idempotency_key.as_deref(), Some("k-1"));
        assert_eq!(request.client_info.get(LOCALE_KEY).map(String::as_str), Some("es"));
    }

    #[test]
    fn request_fields_default_when_missing() {
        let request: TurnRequest = serde_json::from_str(r#"{"message":"hello"}"#).unwrap();
        assert_eq!(request, TurnRequest::new("hello"));
    }
}
