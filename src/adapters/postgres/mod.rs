//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresSessionStore` - sessions, turns and idempotency records
//!
//! Schema lives in `migrations/` and is embedded via [`MIGRATOR`].

mod postgres_session_store;

pub use postgres_session_store::{PostgresSessionStore, MIGRATOR};
