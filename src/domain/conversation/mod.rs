//! Conversation domain module.
//!
//! The session aggregate, its immutable turns, idempotency records and the
//! recommendation payloads a concluded session produces.

mod idempotency;
mod recommendation;
mod session;
mod turn;

pub use idempotency::{IdempotencyKey, IdempotencyRecord, Reservation, MAX_KEY_LENGTH};
pub use recommendation::{RecommendationRequest, Song};
pub use session::{ConversationSession, EndReason, SessionContext, SessionError};
pub use turn::{ConversationTurn, EmotionalSignals, InputType, ResponseType};
