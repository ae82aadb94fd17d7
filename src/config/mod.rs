//! Layered configuration.
//!
//! Values come from the environment (and a `.env` file during development)
//! under the `MOOD_DIALOGUE` prefix, with `__` between nesting levels. Every
//! section has defaults, so an empty environment loads.
//!
//! # Example
//!
//! ```no_run
//! use mood_dialogue::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Sessions allow {} turns", config.session.max_turns);
//! ```

mod collaborators;
mod database;
mod dialogue;
mod error;
mod logging;
mod session;

pub use collaborators::CollaboratorsConfig;
pub use database::DatabaseConfig;
pub use dialogue::DialogueConfig;
pub use error::{ConfigError, ValidationError};
pub use logging::{LogFormat, LoggingConfig};
pub use session::SessionConfig;

use serde::Deserialize;

/// Everything the binary needs to wire a [`crate::application::ConversationManager`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Accumulation, clarity and FSM tuning
    #[serde(default)]
    pub dialogue: DialogueConfig,

    /// Session lifecycle, idempotency and sweeping
    #[serde(default)]
    pub session: SessionConfig,

    /// Mood detection and recommendation services
    #[serde(default)]
    pub collaborators: CollaboratorsConfig,

    /// PostgreSQL persistence; in-memory when absent
    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    /// Log filter and format
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Reads `.env` if present, then the prefixed environment.
    ///
    /// - `MOOD_DIALOGUE__SESSION__MAX_TURNS=12` -> `session.max_turns = 12`
    /// - `MOOD_DIALOGUE__DATABASE__URL=...` -> `database.url = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("MOOD_DIALOGUE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Checks every section, stopping at the first problem.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.dialogue.validate()?;
        self.session.validate()?;
        self.collaborators.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        self.logging.validate()?;
        Ok(())
    }
}
