//! In-memory adapters for tests and single-process deployments.

mod in_memory_session_store;

pub use in_memory_session_store::InMemorySessionStore;
