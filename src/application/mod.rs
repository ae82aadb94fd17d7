//! Application layer - turn orchestration and session lifecycle.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! [`ConversationManager`] is the single entry point for processing turns;
//! [`ExpirySweeper`] runs beside it in the background.

mod conversation_manager;
mod errors;
mod expiry_sweeper;
mod requests;
pub mod responses;
mod session_locks;

pub use conversation_manager::{ConversationManager, ManagerSettings};
pub use errors::ConversationError;
pub use expiry_sweeper::{ExpirySweeper, ExpirySweeperConfig};
pub use requests::{
    SessionStart, SessionStatus, TurnRequest, TurnResponse, LOCALE_KEY, REQUEST_ID_KEY,
};
pub use session_locks::SessionLocks;
