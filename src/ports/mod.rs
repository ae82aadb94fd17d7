//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the dialogue core and the outside world. Adapters implement these ports.
//!
//! - `MoodDetector` - free text to mood label, intensity and confidence
//! - `Recommender` - emotional snapshot to ordered song list
//! - `SessionStore` - sessions, turns and idempotency records

mod mood_detector;
mod recommender;
mod session_store;

pub use mood_detector::{CollaboratorError, MoodDetection, MoodDetector};
pub use recommender::Recommender;
pub use session_store::{is_sweepable, CleanupReport, SessionStore, StoreError};
