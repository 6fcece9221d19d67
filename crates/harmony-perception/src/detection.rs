//! Raw detector output and confidence-filtered people counting.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use harmony_types::{Frame, HarmonyError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Class index of "person" in COCO-style detector output.
pub const PERSON_CLASS: u32 = 0;

/// Default minimum confidence for a detection to count.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;

/// One object found in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub confidence: f32,
}

impl Detection {
    pub fn person(confidence: f32) -> Self {
        Self {
            class_id: PERSON_CLASS,
            confidence,
        }
    }
}

/// Number of person detections whose confidence is strictly above
/// `threshold`.
pub fn count_people(detections: &[Detection], threshold: f32) -> u32 {
    detections
        .iter()
        .filter(|d| d.class_id == PERSON_CLASS && d.confidence > threshold)
        .count() as u32
}

/// Object detector run on each perception frame.
#[async_trait]
pub trait PersonDetector: Send + Sync {
    /// Detect objects in `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`HarmonyError::Collaborator`] if the model cannot process
    /// the frame.
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, HarmonyError>;
}

/// Detector that reports a fixed, replaceable set of detections.
///
/// Used by the headless binary and by tests.
pub struct StaticDetector {
    scene: Mutex<Result<Vec<Detection>, HarmonyError>>,
    calls: AtomicUsize,
}

impl Default for StaticDetector {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl StaticDetector {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            scene: Mutex::new(Ok(detections)),
            calls: AtomicUsize::new(0),
        }
    }

    /// Report `detections` from the next call on.
    pub fn set(&self, detections: Vec<Detection>) {
        *self.scene.lock() = Ok(detections);
    }

    /// Fail every call with `error` until [`set`][Self::set] is called.
    pub fn fail_with(&self, error: HarmonyError) {
        *self.scene.lock() = Err(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersonDetector for StaticDetector {
    async fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, HarmonyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.scene.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_confident_people_are_counted() {
        let detections = [
            Detection::person(0.9),
            Detection::person(0.61),
            Detection::person(0.6),
            Detection::person(0.2),
            Detection {
                class_id: 2,
                confidence: 0.99,
            },
        ];
        assert_eq!(count_people(&detections, DEFAULT_CONFIDENCE_THRESHOLD), 2);
    }

    #[test]
    fn empty_scene_counts_zero() {
        assert_eq!(count_people(&[], 0.0), 0);
    }

    #[tokio::test]
    async fn static_detector_can_be_rescripted() {
        let detector = StaticDetector::new(vec![Detection::person(0.8)]);
        let frame = Frame::new(1, 1, vec![0u8; 3]);
        assert_eq!(detector.detect(&frame).await.unwrap().len(), 1);

        detector.fail_with(HarmonyError::collaborator("detect", "model unloaded"));
        assert!(detector.detect(&frame).await.is_err());

        detector.set(Vec::new());
        assert!(detector.detect(&frame).await.unwrap().is_empty());
        assert_eq!(detector.calls(), 3);
    }
}
