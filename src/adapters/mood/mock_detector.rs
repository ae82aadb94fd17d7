//! Mock mood detector for testing.
//!
//! Scripted results are consumed in order; once the script runs dry the mock
//! falls back to the keyword lexicon so multi-turn tests stay realistic.
//!
//! # Example
//!
//! ```ignore
//! let detector = MockMoodDetector::new()
//!     .with_detection(MoodDetection::new(Mood::Sad, 0.8, 0.9))
//!     .with_delay(Duration::from_millis(50));
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

use super::LexiconMoodDetector;
use crate::ports::{CollaboratorError, MoodDetection, MoodDetector};

/// A scripted outcome.
#[derive(Debug, Clone)]
pub enum MockMoodResponse {
    Detection(MoodDetection),
    Error(CollaboratorError),
}

#[derive(Debug, Clone, Default)]
pub struct MockMoodDetector {
    responses: Arc<Mutex<VecDeque<MockMoodResponse>>>,
    delay: Duration,
    always_fail: Option<CollaboratorError>,
    calls: Arc<Mutex<Vec<String>>>,
    lexicon: LexiconMoodDetector,
}

impl MockMoodDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful detection.
    pub fn with_detection(self, detection: MoodDetection) -> Self {
        self.push(MockMoodResponse::Detection(detection));
        self
    }

    /// Queues a failure.
    pub fn with_error(self, error: CollaboratorError) -> Self {
        self.push(MockMoodResponse::Error(error));
        self
    }

    /// Fails every call with `error`.
    pub fn failing(mut self, error: CollaboratorError) -> Self {
        self.always_fail = Some(error);
        self
    }

    /// Sets simulated latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Texts passed to the detector, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, response: MockMoodResponse) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    fn next_response(&self) -> Option<MockMoodResponse> {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

#[async_trait]
impl MoodDetector for MockMoodDetector {
    async fn detect_mood(&self, text: &str) -> Result<MoodDetection, CollaboratorError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        if let Some(error) = &self.always_fail {
            return Err(error.clone());
        }

        match self.next_response() {
            Some(MockMoodResponse::Detection(detection)) => Ok(detection),
            Some(MockMoodResponse::Error(error)) => Err(error),
            None => Ok(self.lexicon.analyze(text)),
        }
    }
}
