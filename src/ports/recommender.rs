//! Recommender port.
//!
//! Takes the finalized emotional snapshot and returns an ordered song list.

use async_trait::async_trait;

use super::mood_detector::CollaboratorError;
use crate::domain::conversation::{RecommendationRequest, Song};

#[async_trait]
pub trait Recommender: Send + Sync {
    /// Returns songs for the request, best first.
    ///
    /// # Errors
    ///
    /// - `Timeout`, `Unavailable` or `InvalidResponse` on collaborator failure
    async fn recommend(&self, request: &RecommendationRequest)
        -> Result<Vec<Song>, CollaboratorError>;
}
