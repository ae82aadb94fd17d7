//! External collaborator configuration (mood detection, recommendation)

use secrecy::Secret;
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Collaborator configuration
///
/// Without URLs the offline lexicon detector and static catalog are used.
#[derive(Debug, Clone, Deserialize)]
pub struct CollaboratorsConfig {
    /// Mood detection service base URL
    pub mood_url: Option<String>,

    /// Recommendation service base URL
    pub recommender_url: Option<String>,

    /// Bearer token sent to both services
    pub api_key: Option<Secret<String>>,

    /// Deadline for each collaborator call, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Songs kept per recommendation
    #[serde(default = "default_recommendation_limit")]
    pub recommendation_limit: usize,
}

impl CollaboratorsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validate collaborator configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        for url in [&self.mood_url, &self.recommender_url].into_iter().flatten() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ValidationError::InvalidCollaboratorUrl(url.clone()));
            }
        }
        if self.timeout_ms == 0 || self.timeout_ms > 60_000 {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.recommendation_limit == 0 {
            return Err(ValidationError::NotPositive("recommendation_limit"));
        }
        Ok(())
    }
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            mood_url: None,
            recommender_url: None,
            api_key: None,
            timeout_ms: default_timeout_ms(),
            recommendation_limit: default_recommendation_limit(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_recommendation_limit() -> usize {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_defaults() {
        let config = CollaboratorsConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(3000));
        assert!(config.mood_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_bad_url() {
        let config = CollaboratorsConfig {
            mood_url: Some("ftp://mood".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidCollaboratorUrl(_))
        ));
    }

    #[test]
    fn test_validation_timeout_bounds() {
        for timeout_ms in [0, 120_000] {
            let config = CollaboratorsConfig {
                timeout_ms,
                ..Default::default()
            };
            assert_eq!(config.validate(), Err(ValidationError::InvalidTimeout));
        }
    }
}
