//! Shared plumbing for JSON-over-HTTP collaborators.

use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, Secret};
use std::time::Duration;

use crate::ports::CollaboratorError;

/// Connection settings for one HTTP collaborator.
#[derive(Debug, Clone)]
pub struct HttpCollaboratorConfig {
    /// Base URL without trailing slash.
    pub base_url: String,
    /// Optional bearer token.
    api_key: Option<Secret<String>>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl HttpCollaboratorConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            timeout: Duration::from_millis(3000),
        }
    }

    pub fn with_api_key(mut self, api_key: Secret<String>) -> Self {
        self.api_key = Some(api_key);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub(crate) fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key.expose_secret()),
            None => request,
        }
    }

    pub(crate) fn build_client(
        &self,
        collaborator: &'static str,
    ) -> Result<Client, CollaboratorError> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| CollaboratorError::Unavailable {
                collaborator,
                message: format!("Failed to create HTTP client: {}", e),
            })
    }

    pub(crate) fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

/// Maps a transport failure onto the collaborator taxonomy.
pub(crate) fn transport_error(
    collaborator: &'static str,
    timeout_ms: u64,
    err: reqwest::Error,
) -> CollaboratorError {
    if err.is_timeout() {
        CollaboratorError::Timeout {
            collaborator,
            timeout_ms,
        }
    } else {
        CollaboratorError::Unavailable {
            collaborator,
            message: format!("Request failed: {}", err),
        }
    }
}

/// Rejects non-2xx responses, keeping the body for the log.
pub(crate) async fn ensure_success(
    collaborator: &'static str,
    response: Response,
) -> Result<Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("Unexpected status {}: {}", status, body);
    if status.is_server_error() || status.as_u16() == 429 {
        Err(CollaboratorError::Unavailable {
            collaborator,
            message,
        })
    } else {
        Err(CollaboratorError::InvalidResponse {
            collaborator,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let config = HttpCollaboratorConfig::new("http://mood.local/");
        assert_eq!(config.endpoint("/v1/mood"), "http://mood.local/v1/mood");
        assert_eq!(config.endpoint("v1/mood"), "http://mood.local/v1/mood");
    }

    #[test]
    fn timeout_is_configurable() {
        let config = HttpCollaboratorConfig::new("http://x").with_timeout(Duration::from_millis(250));
        assert_eq!(config.timeout_ms(), 250);
    }

    #[test]
    fn api_key_is_not_debug_printed() {
        let config = HttpCollaboratorConfig::new("http://x")
            .with_api_key(Secret::new("super-secret".to_string()));
        assert!(!format!("{:?}", config).contains("super-secret"));
    }
}
