//! Conversation turn record.
//!
//! A turn is immutable once persisted. Turn numbers of a session form a
//! gap-free sequence starting at 1; the store enforces it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::dialogue::{ContextSignals, DialogueState, Intent};
use crate::domain::emotion::{EmotionalContext, Mood, MoodQuadrant};
use crate::domain::foundation::{QuestionId, SessionId, Timestamp, ValidationError};

/// How the message was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    #[default]
    Text,
    Voice,
    QuickReply,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::Text => "text",
            InputType::Voice => "voice",
            InputType::QuickReply => "quick_reply",
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "text" => Ok(InputType::Text),
            "voice" => Ok(InputType::Voice),
            "quick_reply" | "button" => Ok(InputType::QuickReply),
            other => Err(ValidationError::invalid_format(
                "input_type",
                format!("unknown input type '{}'", other),
            )),
        }
    }
}

/// What kind of reply the bot produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Greeting,
    Question,
    Confirmation,
    Recommendation,
    Farewell,
    Help,
    /// Generic re-prompt after an unmatched reply.
    Reprompt,
    /// Reply produced while a collaborator was unavailable.
    Fallback,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Greeting => "greeting",
            ResponseType::Question => "question",
            ResponseType::Confirmation => "confirmation",
            ResponseType::Recommendation => "recommendation",
            ResponseType::Farewell => "farewell",
            ResponseType::Help => "help",
            ResponseType::Reprompt => "reprompt",
            ResponseType::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "greeting" => Ok(ResponseType::Greeting),
            "question" => Ok(ResponseType::Question),
            "confirmation" => Ok(ResponseType::Confirmation),
            "recommendation" => Ok(ResponseType::Recommendation),
            "farewell" => Ok(ResponseType::Farewell),
            "help" => Ok(ResponseType::Help),
            "reprompt" => Ok(ResponseType::Reprompt),
            "fallback" => Ok(ResponseType::Fallback),
            other => Err(ValidationError::invalid_format(
                "response_type",
                format!("unknown response type '{}'", other),
            )),
        }
    }
}

/// Emotional aggregate as it stood after the turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalSignals {
    pub dominant_mood: Mood,
    pub avg_intensity: f64,
    pub avg_valence: f64,
    pub avg_arousal: f64,
    pub quadrant: MoodQuadrant,
    pub mood_variance: f64,
    pub is_stable: bool,
}

impl From<&EmotionalContext> for EmotionalSignals {
    fn from(ctx: &EmotionalContext) -> Self {
        Self {
            dominant_mood: ctx.dominant_mood,
            avg_intensity: ctx.avg_intensity,
            avg_valence: ctx.avg_valence,
            avg_arousal: ctx.avg_arousal,
            quadrant: ctx.quadrant(),
            mood_variance: ctx.mood_variance,
            is_stable: ctx.is_stable,
        }
    }
}

/// One accepted user-message / bot-response exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub session_id: SessionId,
    pub turn_number: u32,
    pub user_input: String,
    pub input_type: InputType,
    pub detected_mood: Option<Mood>,
    pub detected_intensity: Option<f64>,
    pub mood_confidence: f64,
    pub matched_keywords: Vec<String>,
    pub intent: Intent,
    pub intent_confidence: f64,
    pub context_signals: ContextSignals,
    pub emotional_signals: EmotionalSignals,
    pub bot_response: String,
    pub response_type: ResponseType,
    pub question_asked: Option<QuestionId>,
    pub state_before: DialogueState,
    pub state_after: DialogueState,
    pub clarity_before: f64,
    pub clarity_after: f64,
    pub clarity_delta: f64,
    /// True when a collaborator failure forced a fallback.
    pub degraded: bool,
    pub created_at: Timestamp,
    pub processing_ms: u64,
}

impl ConversationTurn {
    /// Full state path walked, as `FROM -> TO`.
    pub fn state_change(&self) -> String {
        format!("{} -> {}", self.state_before, self.state_after)
    }
}
