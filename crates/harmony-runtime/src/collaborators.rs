//! Seams for the models and devices the orchestrator drives.
//!
//! None of these traits carry model logic; implementations wrap a camera,
//! a microphone, a classifier or an endpoint.  Every failure is reported as
//! [`HarmonyError::Collaborator`] so the orchestrator can recover from it at
//! the turn boundary.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use harmony_hal::FrameCache;
use harmony_types::{EmotionReading, Frame, HarmonyError, SentimentLabel};

/// Produces the image for a conversational turn.
///
/// `Ok(None)` means no frame is available right now; that is an ordinary
/// quiet turn, not a fault.
#[async_trait]
pub trait FrameCapture: Send + Sync {
    async fn capture_frame(&self) -> Result<Option<Frame>, HarmonyError>;
}

/// Records one utterance and returns its transcript.
///
/// An empty transcript means nobody said anything this turn.
#[async_trait]
pub trait UtteranceCapture: Send + Sync {
    async fn capture_utterance(&self) -> Result<String, HarmonyError>;
}

/// Image post-processing applied before facial analysis.
pub trait FrameFilter: Send + Sync {
    fn apply(&self, frame: Frame) -> Frame;
}

/// Pass-through [`FrameFilter`].
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityFilter;

impl FrameFilter for IdentityFilter {
    fn apply(&self, frame: Frame) -> Frame {
        frame
    }
}

#[async_trait]
pub trait FacialEmotionAnalyzer: Send + Sync {
    /// Per-person dominant emotion for `frame`.  No faces is an empty
    /// reading, not an error.
    async fn analyze(&self, frame: &Frame) -> Result<EmotionReading, HarmonyError>;
}

#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<SentimentLabel, HarmonyError>;
}

#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Write HarmonyBot's reply to `transcript`, given who looks how.
    async fn generate(
        &self,
        transcript: &str,
        emotions: &EmotionReading,
        frame: &Frame,
    ) -> Result<String, HarmonyError>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak `text`, returning only once playback has finished.
    async fn speak(&self, text: &str) -> Result<(), HarmonyError>;
}

/// [`FrameCapture`] that reads the shared [`FrameCache`] instead of opening
/// the camera a second time.
pub struct CachedFrameCapture {
    cache: Arc<FrameCache>,
    max_age: Duration,
}

impl CachedFrameCapture {
    pub fn new(cache: Arc<FrameCache>, max_age: Duration) -> Self {
        Self { cache, max_age }
    }
}

#[async_trait]
impl FrameCapture for CachedFrameCapture {
    async fn capture_frame(&self) -> Result<Option<Frame>, HarmonyError> {
        Ok(self.cache.get_fresh(self.max_age))
    }
}
