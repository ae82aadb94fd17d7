//! HTTP mood detector.
//!
//! `POST {base_url}/v1/mood` with `{"text": ...}`; the service answers with a
//! label, intensity, confidence and the keywords it matched. Labels outside
//! the closed mood set map to neutral.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::adapters::collaborator_http::{ensure_success, transport_error, HttpCollaboratorConfig};
use crate::domain::emotion::Mood;
use crate::ports::{CollaboratorError, MoodDetection, MoodDetector};

const COLLABORATOR: &str = "mood detector";

#[derive(Debug, Serialize)]
struct DetectRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    mood: String,
    intensity: f64,
    confidence: f64,
    #[serde(default)]
    keywords: Vec<String>,
}

impl DetectResponse {
    fn into_detection(self) -> Result<MoodDetection, CollaboratorError> {
        if !self.intensity.is_finite() || !self.confidence.is_finite() {
            return Err(CollaboratorError::InvalidResponse {
                collaborator: COLLABORATOR,
                message: "non-finite intensity or confidence".to_string(),
            });
        }
        let mood = Mood::from_str(&self.mood).unwrap_or_default();
        Ok(MoodDetection::new(
            mood,
            self.intensity.clamp(0.0, 1.0),
            self.confidence.clamp(0.0, 1.0),
        )
        .with_keywords(self.keywords))
    }
}

pub struct HttpMoodDetector {
    config: HttpCollaboratorConfig,
    client: Client,
}

impl HttpMoodDetector {
    pub fn new(config: HttpCollaboratorConfig) -> Result<Self, CollaboratorError> {
        let client = config.build_client(COLLABORATOR)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl MoodDetector for HttpMoodDetector {
    async fn detect_mood(&self, text: &str) -> Result<MoodDetection, CollaboratorError> {
        let request = self
            .client
            .post(self.config.endpoint("v1/mood"))
            .json(&DetectRequest { text });

        let response = self
            .config
            .authorize(request)
            .send()
            .await
            .map_err(|e| transport_error(COLLABORATOR, self.config.timeout_ms(), e))?;
        let response = ensure_success(COLLABORATOR, response).await?;

        let body: DetectResponse =
            response
                .json()
                .await
                .map_err(|e| CollaboratorError::InvalidResponse {
                    collaborator: COLLABORATOR,
                    message: format!("Failed to parse response: {}", e),
                })?;

        body.into_detection()
    }
}
