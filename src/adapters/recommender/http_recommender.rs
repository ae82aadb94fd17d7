//! HTTP recommender.
//!
//! `POST {base_url}/v1/recommendations` with the enriched snapshot as JSON.
//! The service answers `{"songs": [...]}`, best first.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::adapters::collaborator_http::{ensure_success, transport_error, HttpCollaboratorConfig};
use crate::domain::conversation::{RecommendationRequest, Song};
use crate::ports::{CollaboratorError, Recommender};

const COLLABORATOR: &str = "recommender";

#[derive(Debug, Deserialize)]
struct RecommendResponse {
    #[serde(default)]
    songs: Vec<Song>,
}

pub struct HttpRecommender {
    config: HttpCollaboratorConfig,
    client: Client,
    limit: usize,
}

impl HttpRecommender {
    pub fn new(config: HttpCollaboratorConfig) -> Result<Self, CollaboratorError> {
        let client = config.build_client(COLLABORATOR)?;
        Ok(Self {
            config,
            client,
            limit: 10,
        })
    }

    /// Caps how many songs are kept from a response.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }
}

#[async_trait]
impl Recommender for HttpRecommender {
    async fn recommend(
        &self,
        request: &RecommendationRequest,
    ) -> Result<Vec<Song>, CollaboratorError> {
        let builder = self
            .client
            .post(self.config.endpoint("v1/recommendations"))
            .json(request);

        let response = self
            .config
            .authorize(builder)
            .send()
            .await
            .map_err(|e| transport_error(COLLABORATOR, self.config.timeout_ms(), e))?;
        let response = ensure_success(COLLABORATOR, response).await?;

        let body: RecommendResponse =
            response
                .json()
                .await
                .map_err(|e| CollaboratorError::InvalidResponse {
                    collaborator: COLLABORATOR,
                    message: format!("Failed to parse response: {}", e),
                })?;

        let mut songs: Vec<Song> = body
            .songs
            .into_iter()
            .filter(|song| !request.exclude.contains(&song.id))
            .collect();
        songs.truncate(self.limit);
        Ok(songs)
    }
}
