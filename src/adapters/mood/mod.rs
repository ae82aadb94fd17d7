//! Mood detector adapters.
//!
//! - `LexiconMoodDetector` - offline keyword lexicon
//! - `HttpMoodDetector` - remote mood service over JSON
//! - `MockMoodDetector` - scripted results for tests

mod http_detector;
mod lexicon_detector;
mod mock_detector;

pub use http_detector::HttpMoodDetector;
pub use lexicon_detector::LexiconMoodDetector;
pub use mock_detector::{MockMoodDetector, MockMoodResponse};
