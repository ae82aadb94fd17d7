//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Decay constant must be in (0, 1], got {0}")]
    InvalidDecay(f64),

    #[error("Clarity weights must sum to 1.0, got {0}")]
    InvalidClarityWeights(f64),

    #[error("{0} must be positive")]
    NotPositive(&'static str),

    #[error("{0} must be within [0, 1]")]
    OutOfUnitRange(&'static str),

    #[error("Probe threshold must be below the high-clarity threshold")]
    ThresholdsOutOfOrder,

    #[error("Invalid collaborator URL: {0}")]
    InvalidCollaboratorUrl(String),

    #[error("Invalid collaborator timeout")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Invalid log filter: {0}")]
    InvalidLogFilter(String),
}
