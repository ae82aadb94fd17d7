//! Recommender adapters.
//!
//! - `HttpRecommender` - remote recommendation service over JSON
//! - `StaticRecommender` - built-in catalog for offline use
//! - `MockRecommender` - scripted results for tests

mod http_recommender;
mod mock_recommender;
mod static_recommender;

pub use http_recommender::HttpRecommender;
pub use mock_recommender::{MockRecommendation, MockRecommender};
pub use static_recommender::StaticRecommender;
