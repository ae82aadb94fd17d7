//! Conversation session aggregate.
//!
//! One session per active dialogue. The session store owns it; the manager
//! loads a copy, applies one turn and writes it back atomically.
//!
//! # Invariants
//!
//! - `turn_count <= max_turns`
//! - `!is_active` implies `ended_at` is set and `state` is `Ended` or `Timeout`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use super::recommendation::Song;
use crate::domain::dialogue::{ContextSignals, DialogueState};
use crate::domain::emotion::{EmotionalContext, Mood};
use crate::domain::foundation::{
    ErrorCode, QuestionId, SessionId, StateMachine, Timestamp, UserId, ValidationError,
};

/// Why a session was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Listener said goodbye.
    ExitIntent,
    /// Listener was happy with the recommendations.
    Completed,
    /// A message arrived after the turn limit was used up.
    MaxTurnsExceeded,
    /// Inactivity timeout passed.
    Timeout,
    /// Closed through the lifecycle API.
    EndedByClient,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::ExitIntent => "exit_intent",
            EndReason::Completed => "completed",
            EndReason::MaxTurnsExceeded => "max_turns_exceeded",
            EndReason::Timeout => "timeout",
            EndReason::EndedByClient => "ended_by_client",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EndReason {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exit_intent" => Ok(EndReason::ExitIntent),
            "completed" => Ok(EndReason::Completed),
            "max_turns_exceeded" => Ok(EndReason::MaxTurnsExceeded),
            "timeout" => Ok(EndReason::Timeout),
            "ended_by_client" => Ok(EndReason::EndedByClient),
            other => Err(ValidationError::invalid_format(
                "end_reason",
                format!("unknown end reason '{}'", other),
            )),
        }
    }
}

/// Mutable dialogue memory carried from turn to turn.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionContext {
    pub emotional: EmotionalContext,
    pub signals: ContextSignals,
    /// Every question asked so far, oldest first.
    pub asked_questions: Vec<QuestionId>,
    /// Question the next reply is answering.
    pub pending_question: Option<QuestionId>,
    pub depth_probe_count: u32,
    pub context_probe_count: u32,
    pub refinement_count: u32,
    pub last_recommendations: Vec<Song>,
    /// Turns answered with a fallback because a collaborator failed.
    pub degraded_turns: u32,
}

impl SessionContext {
    pub fn has_context(&self) -> bool {
        self.signals.has_any()
    }

    /// Records a question as asked and pending.
    pub fn ask(&mut self, id: QuestionId) {
        self.asked_questions.push(id.clone());
        self.pending_question = Some(id);
    }
}

/// Session-specific errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("session {0} is closed")]
    Closed(SessionId),

    #[error("session {id} has used all {max_turns} turns")]
    TurnLimitReached { id: SessionId, max_turns: u32 },

    #[error("invalid session transition: {0}")]
    InvalidTransition(#[from] ValidationError),
}

impl SessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::Closed(_) => ErrorCode::SessionClosed,
            SessionError::TurnLimitReached { .. } => ErrorCode::SessionClosed,
            SessionError::InvalidTransition(_) => ErrorCode::InvalidStateTransition,
        }
    }
}

/// Conversation session aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSession {
    id: SessionId,
    user_id: UserId,
    state: DialogueState,
    created_at: Timestamp,
    last_activity_at: Timestamp,
    expires_at: Timestamp,
    ended_at: Option<Timestamp>,
    turn_count: u32,
    max_turns: u32,
    inactivity_timeout_secs: u64,
    final_mood: Option<Mood>,
    final_intensity: Option<f64>,
    final_confidence: Option<f64>,
    context: SessionContext,
    is_active: bool,
    end_reason: Option<EndReason>,
    client_info: BTreeMap<String, String>,
}

impl ConversationSession {
    /// Creates a fresh session in `Greeting`.
    ///
    /// # Errors
    ///
    /// - `InvalidFormat` if `max_turns` or the timeout is zero
    pub fn new(
        id: SessionId,
        user_id: UserId,
        max_turns: u32,
        inactivity_timeout_secs: u64,
        client_info: BTreeMap<String, String>,
    ) -> Result<Self, ValidationError> {
        Self::new_at(
            id,
            user_id,
            max_turns,
            inactivity_timeout_secs,
            client_info,
            Timestamp::now(),
        )
    }

    /// Like [`new`](Self::new) with an explicit creation time.
    pub fn new_at(
        id: SessionId,
        user_id: UserId,
        max_turns: u32,
        inactivity_timeout_secs: u64,
        client_info: BTreeMap<String, String>,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        if max_turns == 0 {
            return Err(ValidationError::invalid_format(
                "max_turns",
                "must be at least 1",
            ));
        }
        if inactivity_timeout_secs == 0 {
            return Err(ValidationError::invalid_format(
                "inactivity_timeout_secs",
                "must be at least 1",
            ));
        }
        Ok(Self {
            id,
            user_id,
            state: DialogueState::Greeting,
            created_at: now,
            last_activity_at: now,
            expires_at: now.plus_secs(inactivity_timeout_secs),
            ended_at: None,
            turn_count: 0,
            max_turns,
            inactivity_timeout_secs,
            final_mood: None,
            final_intensity: None,
            final_confidence: None,
            context: SessionContext::default(),
            is_active: true,
            end_reason: None,
            client_info,
        })
    }

    /// Reconstitute a session from persistence (no validation).
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        id: SessionId,
        user_id: UserId,
        state: DialogueState,
        created_at: Timestamp,
        last_activity_at: Timestamp,
        expires_at: Timestamp,
        ended_at: Option<Timestamp>,
        turn_count: u32,
        max_turns: u32,
        inactivity_timeout_secs: u64,
        final_mood: Option<Mood>,
        final_intensity: Option<f64>,
        final_confidence: Option<f64>,
        context: SessionContext,
        is_active: bool,
        end_reason: Option<EndReason>,
        client_info: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id,
            user_id,
            state,
            created_at,
            last_activity_at,
            expires_at,
            ended_at,
            turn_count,
            max_turns,
            inactivity_timeout_secs,
            final_mood,
            final_intensity,
            final_confidence,
            context,
            is_active,
            end_reason,
            client_info,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn state(&self) -> DialogueState {
        self.state
    }

    pub fn created_at(&self) -> &Timestamp {
        &self.created_at
    }

    pub fn last_activity_at(&self) -> &Timestamp {
        &self.last_activity_at
    }

    pub fn expires_at(&self) -> &Timestamp {
        &self.expires_at
    }

    pub fn ended_at(&self) -> Option<&Timestamp> {
        self.ended_at.as_ref()
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    pub fn inactivity_timeout_secs(&self) -> u64 {
        self.inactivity_timeout_secs
    }

    pub fn final_mood(&self) -> Option<Mood> {
        self.final_mood
    }

    pub fn final_intensity(&self) -> Option<f64> {
        self.final_intensity
    }

    pub fn final_confidence(&self) -> Option<f64> {
        self.final_confidence
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    pub fn client_info(&self) -> &BTreeMap<String, String> {
        &self.client_info
    }

    /// Number the next accepted turn will carry.
    pub fn next_turn_number(&self) -> u32 {
        self.turn_count + 1
    }

    pub fn has_turns_left(&self) -> bool {
        self.turn_count < self.max_turns
    }

    /// Returns true once the final mood has been set.
    pub fn is_concluded(&self) -> bool {
        self.final_mood.is_some()
    }

    /// Returns true if the inactivity deadline has passed at `now`.
    pub fn is_expired_at(&self, now: &Timestamp) -> bool {
        now.is_after(&self.expires_at)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Applies the outcome of one accepted turn.
    ///
    /// `state` is the end of an already validated transition path.
    ///
    /// # Errors
    ///
    /// - `Closed` if the session is no longer active
    /// - `TurnLimitReached` if every turn has been used
    pub fn apply_turn(
        &mut self,
        state: DialogueState,
        context: SessionContext,
        at: Timestamp,
    ) -> Result<u32, SessionError> {
        self.ensure_active()?;
        if !self.has_turns_left() {
            return Err(SessionError::TurnLimitReached {
                id: self.id,
                max_turns: self.max_turns,
            });
        }
        self.turn_count += 1;
        self.state = state;
        self.context = context;
        self.touch_at(at);
        Ok(self.turn_count)
    }

    /// Fixes the mood the dialogue settled on.
    pub fn conclude(&mut self, mood: Mood, intensity: f64, confidence: f64) {
        self.final_mood = Some(mood);
        self.final_intensity = Some(intensity.clamp(0.0, 1.0));
        self.final_confidence = Some(confidence.clamp(0.0, 1.0));
    }

    /// Refreshes activity and pushes the expiry deadline forward.
    pub fn touch_at(&mut self, at: Timestamp) {
        self.last_activity_at = at;
        self.expires_at = at.plus_secs(self.inactivity_timeout_secs);
    }

    /// Closes the session, moving it to `Ended` unless already terminal.
    ///
    /// The final mood is taken from the emotional context if not yet set.
    ///
    /// # Errors
    ///
    /// - `Closed` if the session is already closed
    pub fn close(&mut self, reason: EndReason, at: Timestamp) -> Result<(), SessionError> {
        self.ensure_active()?;
        if !self.state.is_terminal() {
            self.state = self.state.transition_to(DialogueState::Ended)?;
        }
        self.finish(reason, at);
        Ok(())
    }

    /// Moves the session to `Timeout`.
    ///
    /// # Errors
    ///
    /// - `Closed` if the session is already closed
    pub fn time_out(&mut self, at: Timestamp) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.state = self.state.transition_to(DialogueState::Timeout)?;
        self.finish(EndReason::Timeout, at);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Private helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn finish(&mut self, reason: EndReason, at: Timestamp) {
        if !self.is_concluded() && self.context.emotional.has_observations() {
            let emotional = &self.context.emotional;
            let (mood, intensity, confidence) = (
                emotional.dominant_mood,
                emotional.avg_intensity,
                emotional.mean_confidence(),
            );
            self.conclude(mood, intensity, confidence);
        }
        self.is_active = false;
        self.ended_at = Some(at);
        self.end_reason = Some(reason);
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.is_active {
            Ok(())
        } else {
            Err(SessionError::Closed(self.id))
        }
    }
}
