//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the dialogue core to external systems:
//! - `memory` - In-memory session store
//! - `postgres` - PostgreSQL session store
//! - `mood` - Mood detectors (lexicon, HTTP, mock)
//! - `recommender` - Recommenders (HTTP, static catalog, mock)

pub mod collaborator_http;
pub mod memory;
pub mod mood;
pub mod postgres;
pub mod recommender;

pub use collaborator_http::HttpCollaboratorConfig;
pub use memory::InMemorySessionStore;
pub use mood::{HttpMoodDetector, LexiconMoodDetector, MockMoodDetector, MockMoodResponse};
pub use postgres::PostgresSessionStore;
pub use recommender::{HttpRecommender, MockRecommendation, MockRecommender, StaticRecommender};
