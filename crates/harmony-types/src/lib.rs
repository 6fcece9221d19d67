//! `harmony-types` – shared vocabulary for every HarmonyBot crate.
//!
//! Frames, affect labels, actuator commands, the arbitration [`Mode`], and
//! the global [`HarmonyError`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Frames
// ─────────────────────────────────────────────────────────────────────────────

/// A captured camera frame.
///
/// Pixel data is held in an immutable [`Bytes`] buffer, so cloning a frame
/// hands out a snapshot that can never alias the cache's copy mutably.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Raw RGB24 pixel data, row-major, straight from the camera driver.
    pub data: Bytes,
    /// Wall-clock time the frame was captured.  Display only; staleness is
    /// measured on the monotonic clock.
    pub captured_at: DateTime<Utc>,
    captured: Instant,
}

impl Frame {
    /// Build a frame stamped with the current time.
    pub fn new(width: u32, height: u32, data: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            data: data.into(),
            captured_at: Utc::now(),
            captured: Instant::now(),
        }
    }

    /// Build a frame that was captured `age` ago.
    pub fn with_age(width: u32, height: u32, data: impl Into<Bytes>, age: Duration) -> Self {
        let mut frame = Self::new(width, height, data);
        frame.captured = frame.captured.checked_sub(age).unwrap_or(frame.captured);
        frame.captured_at = chrono::Duration::from_std(age)
            .ok()
            .and_then(|d| frame.captured_at.checked_sub_signed(d))
            .unwrap_or(frame.captured_at);
        frame
    }

    /// Time elapsed since capture, on the monotonic clock.
    pub fn age(&self) -> Duration {
        self.captured.elapsed()
    }

    /// `true` when the frame carries no pixel data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Byte length of an RGB24 buffer for these dimensions, or `None` if it
    /// does not fit in `usize`.
    pub fn rgb_len(&self) -> Option<usize> {
        rgb_len(self.width, self.height)
    }
}

/// Byte length of a `width` × `height` RGB24 buffer.
pub fn rgb_len(width: u32, height: u32) -> Option<usize> {
    usize::try_from(width)
        .ok()?
        .checked_mul(usize::try_from(height).ok()?)?
        .checked_mul(3)
}

// ─────────────────────────────────────────────────────────────────────────────
// Affect labels
// ─────────────────────────────────────────────────────────────────────────────

/// Sentiment label assigned to one spoken utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Anger,
    Fear,
    Neutral,
    Sad,
    Disgust,
    Happy,
    Surprise,
}

impl SentimentLabel {
    /// Every label, in the candidate order sent to zero-shot classifiers.
    pub const ALL: [SentimentLabel; 7] = [
        SentimentLabel::Anger,
        SentimentLabel::Fear,
        SentimentLabel::Neutral,
        SentimentLabel::Sad,
        SentimentLabel::Disgust,
        SentimentLabel::Happy,
        SentimentLabel::Surprise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Anger => "anger",
            SentimentLabel::Fear => "fear",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Sad => "sad",
            SentimentLabel::Disgust => "disgust",
            SentimentLabel::Happy => "happy",
            SentimentLabel::Surprise => "surprise",
        }
    }

    /// `true` for anger, fear, sad and disgust.
    pub fn is_negative(&self) -> bool {
        matches!(
            self,
            SentimentLabel::Anger
                | SentimentLabel::Fear
                | SentimentLabel::Sad
                | SentimentLabel::Disgust
        )
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SentimentLabel {
    type Err = HarmonyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        SentimentLabel::ALL
            .into_iter()
            .find(|label| label.as_str() == wanted)
            .ok_or_else(|| HarmonyError::Parsing(format!("unknown sentiment label '{s}'")))
    }
}

/// Dominant facial expression reported for one detected face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacialEmotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
}

impl FacialEmotion {
    pub const ALL: [FacialEmotion; 7] = [
        FacialEmotion::Angry,
        FacialEmotion::Disgust,
        FacialEmotion::Fear,
        FacialEmotion::Happy,
        FacialEmotion::Sad,
        FacialEmotion::Surprise,
        FacialEmotion::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FacialEmotion::Angry => "angry",
            FacialEmotion::Disgust => "disgust",
            FacialEmotion::Fear => "fear",
            FacialEmotion::Happy => "happy",
            FacialEmotion::Sad => "sad",
            FacialEmotion::Surprise => "surprise",
            FacialEmotion::Neutral => "neutral",
        }
    }

    /// Rank used to pick the most concerning face in a group:
    /// angry > fear > sad > disgust > surprise > happy > neutral.
    pub fn severity(&self) -> u8 {
        match self {
            FacialEmotion::Angry => 6,
            FacialEmotion::Fear => 5,
            FacialEmotion::Sad => 4,
            FacialEmotion::Disgust => 3,
            FacialEmotion::Surprise => 2,
            FacialEmotion::Happy => 1,
            FacialEmotion::Neutral => 0,
        }
    }

    /// `true` for angry, fear, sad and disgust.
    pub fn is_negative(&self) -> bool {
        matches!(
            self,
            FacialEmotion::Angry | FacialEmotion::Fear | FacialEmotion::Sad | FacialEmotion::Disgust
        )
    }
}

impl fmt::Display for FacialEmotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FacialEmotion {
    type Err = HarmonyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        FacialEmotion::ALL
            .into_iter()
            .find(|e| e.as_str() == wanted)
            .ok_or_else(|| HarmonyError::Parsing(format!("unknown facial emotion '{s}'")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Emotion readings
// ─────────────────────────────────────────────────────────────────────────────

/// Pixel bounding box of a detected face.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// The facial-emotion result for a single person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceReading {
    /// Dominant expression.
    pub emotion: FacialEmotion,
    /// Classifier confidence for `emotion` (the collaborator's own scale).
    pub confidence: f32,
    #[serde(flatten)]
    pub region: FaceBox,
}

/// Per-person facial readings for one conversational turn, keyed by person
/// identifier (`"Person 1"`, `"Person 2"`, …).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmotionReading(BTreeMap<String, FaceReading>);

impl EmotionReading {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conventional identifier for the face at zero-based `index`.
    pub fn person_id(index: usize) -> String {
        format!("Person {}", index + 1)
    }

    /// Insert or replace the reading for `person`.
    pub fn insert(&mut self, person: impl Into<String>, reading: FaceReading) {
        self.0.insert(person.into(), reading);
    }

    pub fn get(&self, person: &str) -> Option<&FaceReading> {
        self.0.get(person)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FaceReading)> {
        self.0.iter()
    }

    /// The most severe dominant expression across all faces, or
    /// [`FacialEmotion::Neutral`] when no face was detected.
    pub fn most_severe(&self) -> FacialEmotion {
        self.0
            .values()
            .map(|r| r.emotion)
            .fold(FacialEmotion::Neutral, |worst, e| {
                if e.severity() > worst.severity() { e } else { worst }
            })
    }
}

impl FromIterator<(String, FaceReading)> for EmotionReading {
    fn from_iter<I: IntoIterator<Item = (String, FaceReading)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actuator requests
// ─────────────────────────────────────────────────────────────────────────────

/// Category of actuator request. Each kind is an independent lane with its
/// own priority, rate limit and timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Emotion,
    Head,
    Reset,
}

impl RequestKind {
    pub const ALL: [RequestKind; 3] = [RequestKind::Emotion, RequestKind::Head, RequestKind::Reset];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Emotion => "emotion",
            RequestKind::Head => "head",
            RequestKind::Reset => "reset",
        }
    }

    /// Emotion and reset share the high-priority lane; head tracking is low.
    pub fn priority(&self) -> Priority {
        match self {
            RequestKind::Emotion | RequestKind::Reset => Priority::High,
            RequestKind::Head => Priority::Low,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatch priority of a request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    High,
}

/// Typed payload of an actuator request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ActuatorCommand {
    /// Signal an affect to the robot.
    Emotion { sentiment: SentimentLabel },
    /// Head-tracking update: number of people in view and/or a target angle.
    Head {
        number: Option<u32>,
        angle: Option<i32>,
    },
    /// Return the robot to its default pose and expression.
    Reset,
}

impl ActuatorCommand {
    pub fn emotion(sentiment: SentimentLabel) -> Self {
        ActuatorCommand::Emotion { sentiment }
    }

    /// Head update carrying only a people count.
    pub fn head_count(number: u32) -> Self {
        ActuatorCommand::Head {
            number: Some(number),
            angle: None,
        }
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            ActuatorCommand::Emotion { .. } => RequestKind::Emotion,
            ActuatorCommand::Head { .. } => RequestKind::Head,
            ActuatorCommand::Reset => RequestKind::Reset,
        }
    }

    /// JSON body expected by the actuator controller for this command.
    ///
    /// # Errors
    ///
    /// Returns [`HarmonyError::InvalidRequest`] for a head command that
    /// carries neither a count nor an angle.
    pub fn wire_body(&self) -> Result<Value, HarmonyError> {
        match self {
            ActuatorCommand::Emotion { sentiment } => Ok(json!({ "sentiment": sentiment })),
            ActuatorCommand::Head { number, angle } => {
                let mut body = serde_json::Map::new();
                if let Some(a) = angle {
                    body.insert("angle".into(), json!(a));
                }
                if let Some(n) = number {
                    body.insert("number".into(), json!(n));
                }
                if body.is_empty() {
                    return Err(HarmonyError::InvalidRequest(
                        "head command needs a number or an angle".into(),
                    ));
                }
                Ok(Value::Object(body))
            }
            ActuatorCommand::Reset => Ok(json!({ "action": "reset" })),
        }
    }
}

/// An immutable, timestamped actuator request.
#[derive(Debug, Clone)]
pub struct ActuatorRequest {
    command: ActuatorCommand,
    priority: Priority,
    submitted_at: Instant,
}

impl ActuatorRequest {
    pub fn new(command: ActuatorCommand) -> Self {
        let priority = command.kind().priority();
        Self {
            command,
            priority,
            submitted_at: Instant::now(),
        }
    }

    pub fn command(&self) -> &ActuatorCommand {
        &self.command
    }

    pub fn kind(&self) -> RequestKind {
        self.command.kind()
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Arbitration mode
// ─────────────────────────────────────────────────────────────────────────────

/// System-wide arbitration state for the actuator channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Perception owns the head lane.
    #[default]
    Tracking,
    /// A reaction is in progress; head updates are suppressed.
    Responding,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Tracking => f.write_str("TRACKING"),
            Mode::Responding => f.write_str("RESPONDING"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Global error type spanning collaborator failures, hardware faults and
/// malformed input.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HarmonyError {
    #[error("Collaborator failure during {stage}: {details}")]
    Collaborator { stage: String, details: String },

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Invalid actuator request: {0}")]
    InvalidRequest(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Parsing Error: {0}")]
    Parsing(String),
}

impl HarmonyError {
    /// Shorthand for a [`HarmonyError::Collaborator`] failure.
    pub fn collaborator(stage: impl Into<String>, details: impl fmt::Display) -> Self {
        HarmonyError::Collaborator {
            stage: stage.into(),
            details: details.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(emotion: FacialEmotion) -> FaceReading {
        FaceReading {
            emotion,
            confidence: 0.8,
            region: FaceBox::default(),
        }
    }

    #[test]
    fn sentiment_labels_parse_case_insensitively() {
        assert_eq!("Anger".parse::<SentimentLabel>().unwrap(), SentimentLabel::Anger);
        assert_eq!(" sad ".parse::<SentimentLabel>().unwrap(), SentimentLabel::Sad);
        assert!(matches!(
            "furious".parse::<SentimentLabel>(),
            Err(HarmonyError::Parsing(_))
        ));
    }

    #[test]
    fn negative_sentiments() {
        let negative: Vec<_> = SentimentLabel::ALL
            .into_iter()
            .filter(SentimentLabel::is_negative)
            .collect();
        assert_eq!(
            negative,
            vec![
                SentimentLabel::Anger,
                SentimentLabel::Fear,
                SentimentLabel::Sad,
                SentimentLabel::Disgust
            ]
        );
    }

    #[test]
    fn most_severe_defaults_to_neutral() {
        assert_eq!(EmotionReading::new().most_severe(), FacialEmotion::Neutral);
    }

    #[test]
    fn most_severe_picks_highest_rank() {
        let mut reading = EmotionReading::new();
        reading.insert(EmotionReading::person_id(0), face(FacialEmotion::Happy));
        reading.insert(EmotionReading::person_id(1), face(FacialEmotion::Disgust));
        reading.insert(EmotionReading::person_id(2), face(FacialEmotion::Surprise));
        assert_eq!(reading.most_severe(), FacialEmotion::Disgust);

        reading.insert("Person 4", face(FacialEmotion::Angry));
        assert_eq!(reading.most_severe(), FacialEmotion::Angry);
    }

    #[test]
    fn face_reading_uses_flat_wire_shape() {
        let json = r#"{"Person 1":{"emotion":"angry","confidence":0.8,"x":10,"y":20,"w":30,"h":40}}"#;
        let reading: EmotionReading = serde_json::from_str(json).unwrap();
        let p1 = reading.get("Person 1").unwrap();
        assert_eq!(p1.emotion, FacialEmotion::Angry);
        assert_eq!(p1.region, FaceBox { x: 10, y: 20, w: 30, h: 40 });
    }

    #[test]
    fn wire_bodies_match_controller_contract() {
        assert_eq!(
            ActuatorCommand::emotion(SentimentLabel::Anger).wire_body().unwrap(),
            json!({"sentiment": "anger"})
        );
        assert_eq!(
            ActuatorCommand::head_count(2).wire_body().unwrap(),
            json!({"number": 2})
        );
        assert_eq!(
            ActuatorCommand::Head { number: Some(1), angle: Some(-15) }
                .wire_body()
                .unwrap(),
            json!({"number": 1, "angle": -15})
        );
        assert_eq!(
            ActuatorCommand::Reset.wire_body().unwrap(),
            json!({"action": "reset"})
        );
    }

    #[test]
    fn empty_head_command_is_invalid() {
        let cmd = ActuatorCommand::Head { number: None, angle: None };
        assert!(matches!(cmd.wire_body(), Err(HarmonyError::InvalidRequest(_))));
    }

    #[test]
    fn request_priority_follows_kind() {
        assert_eq!(
            ActuatorRequest::new(ActuatorCommand::Reset).priority(),
            Priority::High
        );
        assert_eq!(
            ActuatorRequest::new(ActuatorCommand::head_count(0)).priority(),
            Priority::Low
        );
        assert!(Priority::High > Priority::Low);
    }

    #[test]
    fn frame_age_uses_capture_instant() {
        let fresh = Frame::new(1, 1, vec![0u8; 3]);
        assert!(fresh.age() < Duration::from_secs(1));
        assert!(!fresh.is_empty());

        let old = Frame::with_age(1, 1, vec![0u8; 3], Duration::from_secs(10));
        assert!(old.age() >= Duration::from_secs(10));
        assert!(old.captured_at < fresh.captured_at);
    }

    #[test]
    fn rgb_len_does_not_wrap() {
        assert_eq!(rgb_len(4, 2), Some(24));
        assert_eq!(rgb_len(0, 480), Some(0));
        #[cfg(target_pointer_width = "64")]
        assert_eq!(rgb_len(65_536, 65_536), Some(65_536 * 65_536 * 3));
        assert_eq!(rgb_len(u32::MAX, u32::MAX), None);
        assert_eq!(Frame::new(640, 480, Vec::<u8>::new()).rgb_len(), Some(921_600));
    }

    #[test]
    fn mode_defaults_to_tracking() {
        assert_eq!(Mode::default(), Mode::Tracking);
        assert_eq!(Mode::Responding.to_string(), "RESPONDING");
    }

    #[test]
    fn harmony_error_display() {
        let err = HarmonyError::collaborator("analyze", "model offline");
        assert!(err.to_string().contains("analyze"));
        assert!(err.to_string().contains("model offline"));
    }
}
