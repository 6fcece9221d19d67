//! [`Orchestrator`] – one conversational turn at a time.
//!
//! Each turn:
//!
//! 1. **Capture** – the turn's frame and utterance are captured concurrently;
//!    both must finish.  An empty transcript or a missing frame ends the
//!    turn with [`TurnOutcome::NoInput`] before anything else is touched.
//! 2. **Analyze** – the filtered frame goes to the facial analyzer and the
//!    transcript to the sentiment classifier, concurrently.
//! 3. **Decide** – [`should_react`].
//! 4. **React** – take the actuator channel from head tracking
//!    ([`ModeArbiter::pause`]), signal the emotion, generate and speak a
//!    reply, reset the robot, and hand the channel back
//!    ([`ModeArbiter::resume`]).  Actuator failures degrade the turn; they do
//!    not abort it.
//!
//! [`Orchestrator::tick`] is the single recovery boundary: whatever a turn
//! returns as `Err`, perception is resumed before the next turn starts.

use std::sync::Arc;
use std::time::Duration;

use harmony_hal::ActuatorClient;
use harmony_kernel::ModeArbiter;
use harmony_types::{ActuatorCommand, HarmonyError, SentimentLabel};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::collaborators::{
    FacialEmotionAnalyzer, FrameCapture, FrameFilter, ResponseGenerator, SentimentClassifier,
    SpeechSynthesizer, UtteranceCapture,
};
use crate::decision::should_react;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Delays and retry budgets for [`Orchestrator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Wait after pausing perception, before the emotion signal.
    pub pause_settle: Duration,
    /// Wait after the reset signal, before resuming perception.
    pub reset_settle: Duration,
    /// Gap between two completed turns.
    pub idle_gap: Duration,
    /// Wait after a turn with no transcript.
    pub empty_capture_delay: Duration,
    /// Wait after a failed turn.
    pub error_delay: Duration,
    pub emotion_attempts: u32,
    pub emotion_timeout: Duration,
    pub reset_attempts: u32,
    pub reset_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            pause_settle: Duration::from_millis(500),
            reset_settle: Duration::from_secs(2),
            idle_gap: Duration::from_millis(500),
            empty_capture_delay: Duration::from_secs(1),
            error_delay: Duration::from_secs(2),
            emotion_attempts: 3,
            emotion_timeout: Duration::from_secs(5),
            reset_attempts: 2,
            reset_timeout: Duration::from_secs(5),
        }
    }
}

/// The external collaborators a turn drives.
#[derive(Clone)]
pub struct Collaborators {
    pub frames: Arc<dyn FrameCapture>,
    pub utterances: Arc<dyn UtteranceCapture>,
    pub filter: Arc<dyn FrameFilter>,
    pub faces: Arc<dyn FacialEmotionAnalyzer>,
    pub sentiment: Arc<dyn SentimentClassifier>,
    pub responder: Arc<dyn ResponseGenerator>,
    pub speech: Arc<dyn SpeechSynthesizer>,
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Nothing was said, or no camera frame was available.
    NoInput,
    /// The mood did not call for a reaction.
    Calm { sentiment: SentimentLabel },
    /// A full reaction ran.  The flags report whether the emotion and reset
    /// signals reached the robot.
    Reacted {
        sentiment: SentimentLabel,
        emotion_delivered: bool,
        reset_delivered: bool,
    },
    /// The turn failed; perception has been resumed.
    Failed(HarmonyError),
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

pub struct Orchestrator {
    arbiter: Arc<ModeArbiter>,
    client: Arc<ActuatorClient>,
    collaborators: Collaborators,
    config: OrchestratorConfig,
    turns: u64,
}

impl Orchestrator {
    pub fn new(
        arbiter: Arc<ModeArbiter>,
        client: Arc<ActuatorClient>,
        collaborators: Collaborators,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            arbiter,
            client,
            collaborators,
            config,
            turns: 0,
        }
    }

    /// Turns started so far.
    pub fn turns(&self) -> u64 {
        self.turns
    }

    /// Run one turn.  Errors are returned as-is; use [`tick`][Self::tick]
    /// for the recovering variant.
    pub async fn run_turn(&self) -> Result<TurnOutcome, HarmonyError> {
        let c = &self.collaborators;

        // ── Capture ──────────────────────────────────────────────────────────
        let (frame, transcript) =
            tokio::join!(c.frames.capture_frame(), c.utterances.capture_utterance());
        let transcript = transcript?;
        let transcript = transcript.trim();
        if transcript.is_empty() {
            debug!("no speech captured");
            return Ok(TurnOutcome::NoInput);
        }
        let Some(frame) = frame? else {
            debug!("no camera frame available");
            return Ok(TurnOutcome::NoInput);
        };
        let frame = c.filter.apply(frame);
        info!(transcript, "utterance captured");

        // ── Analyze ──────────────────────────────────────────────────────────
        let (faces, sentiment) =
            tokio::join!(c.faces.analyze(&frame), c.sentiment.classify(transcript));
        let (faces, sentiment) = (faces?, sentiment?);
        info!(%sentiment, faces = faces.len(), most_severe = %faces.most_severe(), "turn analysed");

        // ── Decide ───────────────────────────────────────────────────────────
        if !should_react(sentiment, &faces) {
            debug!(%sentiment, "no strong emotion; skipping reaction");
            return Ok(TurnOutcome::Calm { sentiment });
        }

        // ── React ────────────────────────────────────────────────────────────
        self.arbiter.pause().await;
        tokio::time::sleep(self.config.pause_settle).await;

        let emotion_delivered = self
            .client
            .send_with_retry(
                ActuatorCommand::emotion(sentiment),
                self.config.emotion_attempts,
                self.config.emotion_timeout,
            )
            .await;
        if !emotion_delivered {
            warn!(%sentiment, "emotion signal not delivered; continuing without it");
        }

        let reply = c.responder.generate(transcript, &faces, &frame).await?;
        info!(reply = %reply, "speaking response");
        c.speech.speak(&reply).await?;

        let reset_delivered = self
            .client
            .send_with_retry(
                ActuatorCommand::Reset,
                self.config.reset_attempts,
                self.config.reset_timeout,
            )
            .await;
        if !reset_delivered {
            warn!("reset signal not delivered");
        }

        tokio::time::sleep(self.config.reset_settle).await;
        self.arbiter.resume().await;

        Ok(TurnOutcome::Reacted {
            sentiment,
            emotion_delivered,
            reset_delivered,
        })
    }

    /// Run one turn inside its own span, converting any error into
    /// [`TurnOutcome::Failed`] after forcing perception back on.
    pub async fn tick(&mut self) -> TurnOutcome {
        self.turns += 1;
        let span = info_span!("turn", n = self.turns, id = %Uuid::new_v4());
        match self.run_turn().instrument(span.clone()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(parent: &span, error = %e, "turn failed; resuming perception");
                self.arbiter.resume().await;
                TurnOutcome::Failed(e)
            }
        }
    }

    /// Wait to apply after `outcome`.
    pub fn delay_after(&self, outcome: &TurnOutcome) -> Duration {
        match outcome {
            TurnOutcome::NoInput => self.config.empty_capture_delay,
            TurnOutcome::Failed(_) => self.config.error_delay,
            _ => self.config.idle_gap,
        }
    }

    /// Loop turns until `cancel` fires.
    ///
    /// A turn interrupted by cancellation is abandoned; perception is resumed
    /// on the way out.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("conversation loop started");
        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.tick() => outcome,
            };
            let delay = self.delay_after(&outcome);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        self.arbiter.resume().await;
        info!(turns = self.turns, "conversation loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{CachedFrameCapture, IdentityFilter};
    use async_trait::async_trait;
    use harmony_hal::{ActuatorConfig, FrameCache, KindPolicy, SimTransport, TransportError};
    use harmony_types::{EmotionReading, FaceBox, FaceReading, FacialEmotion, Frame, Mode};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Instant;

    // ── Hand-written collaborators ───────────────────────────────────────────

    #[derive(Default)]
    struct Journal(Mutex<Vec<(String, Instant)>>);

    impl Journal {
        fn note(&self, what: impl Into<String>) {
            self.0.lock().push((what.into(), Instant::now()));
        }
        fn entries(&self) -> Vec<String> {
            self.0.lock().iter().map(|(s, _)| s.clone()).collect()
        }
        fn at(&self, what: &str) -> Option<Instant> {
            self.0.lock().iter().find(|(s, _)| s == what).map(|(_, t)| *t)
        }
    }

    struct Scripted {
        journal: Arc<Journal>,
        transcript: String,
        sentiment: SentimentLabel,
        face: Option<FacialEmotion>,
        fail_response: bool,
    }

    #[async_trait]
    impl FrameCapture for Scripted {
        async fn capture_frame(&self) -> Result<Option<Frame>, HarmonyError> {
            self.journal.note("frame");
            Ok(Some(Frame::new(2, 2, vec![0u8; 12])))
        }
    }

    struct BrokenCamera;

    #[async_trait]
    impl FrameCapture for BrokenCamera {
        async fn capture_frame(&self) -> Result<Option<Frame>, HarmonyError> {
            Err(HarmonyError::collaborator("capture", "device unplugged"))
        }
    }

    #[async_trait]
    impl UtteranceCapture for Scripted {
        async fn capture_utterance(&self) -> Result<String, HarmonyError> {
            self.journal.note("utterance");
            Ok(self.transcript.clone())
        }
    }

    #[async_trait]
    impl FacialEmotionAnalyzer for Scripted {
        async fn analyze(&self, _frame: &Frame) -> Result<EmotionReading, HarmonyError> {
            self.journal.note("faces");
            let mut reading = EmotionReading::new();
            if let Some(emotion) = self.face {
                reading.insert(
                    EmotionReading::person_id(0),
                    FaceReading {
                        emotion,
                        confidence: 0.9,
                        region: FaceBox::default(),
                    },
                );
            }
            Ok(reading)
        }
    }

    #[async_trait]
    impl SentimentClassifier for Scripted {
        async fn classify(&self, _text: &str) -> Result<SentimentLabel, HarmonyError> {
            self.journal.note("sentiment");
            Ok(self.sentiment)
        }
    }

    #[async_trait]
    impl ResponseGenerator for Scripted {
        async fn generate(
            &self,
            transcript: &str,
            _emotions: &EmotionReading,
            _frame: &Frame,
        ) -> Result<String, HarmonyError> {
            self.journal.note("generate");
            if self.fail_response {
                return Err(HarmonyError::collaborator("response", "endpoint returned 503"));
            }
            Ok(format!("I hear you: {transcript}"))
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for Scripted {
        async fn speak(&self, _text: &str) -> Result<(), HarmonyError> {
            self.journal.note("speak:start");
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.journal.note("speak:end");
            Ok(())
        }
    }

    // ── Rig ──────────────────────────────────────────────────────────────────

    struct Rig {
        orchestrator: Orchestrator,
        arbiter: Arc<ModeArbiter>,
        transport: Arc<SimTransport>,
        journal: Arc<Journal>,
    }

    fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            pause_settle: Duration::ZERO,
            reset_settle: Duration::from_millis(5),
            idle_gap: Duration::ZERO,
            empty_capture_delay: Duration::from_millis(1),
            error_delay: Duration::from_millis(1),
            ..OrchestratorConfig::default()
        }
    }

    fn rig(
        transcript: &str,
        sentiment: SentimentLabel,
        face: Option<FacialEmotion>,
        fail_response: bool,
    ) -> Rig {
        rig_with_frames(transcript, sentiment, face, fail_response, None)
    }

    fn rig_with_frames(
        transcript: &str,
        sentiment: SentimentLabel,
        face: Option<FacialEmotion>,
        fail_response: bool,
        frames: Option<Arc<dyn FrameCapture>>,
    ) -> Rig {
        let journal = Arc::new(Journal::default());
        let scripted = Arc::new(Scripted {
            journal: journal.clone(),
            transcript: transcript.to_string(),
            sentiment,
            face,
            fail_response,
        });
        let transport = Arc::new(SimTransport::new());
        let client = Arc::new(ActuatorClient::new(
            transport.clone(),
            ActuatorConfig {
                emotion: KindPolicy {
                    min_interval: Duration::ZERO,
                    ..KindPolicy::EMOTION
                },
                reset: KindPolicy {
                    min_interval: Duration::ZERO,
                    ..KindPolicy::RESET
                },
                retry_delay: Duration::from_millis(2),
                ..ActuatorConfig::default()
            },
        ));
        let arbiter = Arc::new(ModeArbiter::new(client.clone(), false));
        let collaborators = Collaborators {
            frames: frames.unwrap_or_else(|| scripted.clone() as Arc<dyn FrameCapture>),
            utterances: scripted.clone(),
            filter: Arc::new(IdentityFilter),
            faces: scripted.clone(),
            sentiment: scripted.clone(),
            responder: scripted.clone(),
            speech: scripted,
        };
        Rig {
            orchestrator: Orchestrator::new(arbiter.clone(), client, collaborators, fast_config()),
            arbiter,
            transport,
            journal,
        }
    }

    // ── Tests ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn angry_turn_reacts_end_to_end() {
        let mut rig = rig(
            "you never listen to me",
            SentimentLabel::Anger,
            Some(FacialEmotion::Neutral),
            false,
        );

        let outcome = rig.orchestrator.tick().await;
        assert_eq!(
            outcome,
            TurnOutcome::Reacted {
                sentiment: SentimentLabel::Anger,
                emotion_delivered: true,
                reset_delivered: true,
            }
        );

        let stats = rig.arbiter.stats();
        assert_eq!((stats.pauses, stats.resumes), (1, 1));
        assert_eq!(rig.arbiter.mode().await, Mode::Tracking);

        assert_eq!(
            rig.transport.bodies_to("/receive"),
            vec![json!({"sentiment": "anger"})]
        );
        assert_eq!(
            rig.transport.bodies_to("/reset"),
            vec![json!({"action": "reset"})]
        );

        let speech_done = rig.journal.at("speak:end").unwrap();
        let reset_sent = rig
            .transport
            .calls()
            .into_iter()
            .find(|c| c.path == "/reset")
            .unwrap()
            .at;
        assert!(speech_done <= reset_sent, "reset sent before speech finished");
        assert_eq!(rig.transport.calls_to("/head"), 0);
    }

    #[tokio::test]
    async fn empty_transcript_touches_nothing() {
        let mut rig = rig("   ", SentimentLabel::Anger, Some(FacialEmotion::Angry), false);
        let outcome = rig.orchestrator.tick().await;
        assert_eq!(outcome, TurnOutcome::NoInput);
        assert_eq!(
            rig.orchestrator.delay_after(&outcome),
            fast_config().empty_capture_delay
        );

        assert!(rig.transport.calls().is_empty());
        assert_eq!(rig.arbiter.stats(), Default::default());
        let entries = rig.journal.entries();
        assert!(!entries.contains(&"faces".to_string()));
        assert!(!entries.contains(&"sentiment".to_string()));
    }

    #[tokio::test]
    async fn missing_frame_is_a_quiet_turn() {
        let cache = Arc::new(FrameCache::new());
        let frames: Arc<dyn FrameCapture> =
            Arc::new(CachedFrameCapture::new(cache, Duration::from_secs(2)));
        let mut rig = rig_with_frames(
            "hello there",
            SentimentLabel::Anger,
            None,
            false,
            Some(frames),
        );

        let outcome = rig.orchestrator.tick().await;
        assert_eq!(outcome, TurnOutcome::NoInput);
        assert_eq!(
            rig.orchestrator.delay_after(&outcome),
            fast_config().empty_capture_delay
        );
        assert!(rig.transport.calls().is_empty());
        assert_eq!(rig.arbiter.stats(), Default::default());
        assert!(!rig.journal.entries().contains(&"sentiment".to_string()));
    }

    #[tokio::test]
    async fn camera_fault_fails_the_turn() {
        let mut rig = rig_with_frames(
            "hello there",
            SentimentLabel::Anger,
            None,
            false,
            Some(Arc::new(BrokenCamera) as Arc<dyn FrameCapture>),
        );

        let outcome = rig.orchestrator.tick().await;
        assert!(matches!(
            outcome,
            TurnOutcome::Failed(HarmonyError::Collaborator { ref stage, .. }) if stage == "capture"
        ));
        assert_eq!(rig.orchestrator.delay_after(&outcome), fast_config().error_delay);
        assert_eq!(rig.arbiter.mode().await, Mode::Tracking);
        assert!(rig.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn calm_turn_skips_reaction() {
        let mut rig = rig("lovely weather", SentimentLabel::Happy, Some(FacialEmotion::Happy), false);
        assert_eq!(
            rig.orchestrator.tick().await,
            TurnOutcome::Calm {
                sentiment: SentimentLabel::Happy
            }
        );
        assert!(rig.transport.calls().is_empty());
        assert_eq!(rig.arbiter.stats().pauses, 0);
    }

    #[tokio::test]
    async fn angry_face_alone_triggers_reaction() {
        let mut rig = rig("fine, whatever", SentimentLabel::Neutral, Some(FacialEmotion::Angry), false);
        assert!(matches!(
            rig.orchestrator.tick().await,
            TurnOutcome::Reacted { .. }
        ));
        // The emotion signal carries the text sentiment.
        assert_eq!(
            rig.transport.bodies_to("/receive"),
            vec![json!({"sentiment": "neutral"})]
        );
    }

    #[tokio::test]
    async fn undelivered_emotion_still_speaks_and_resets() {
        let mut rig = rig("I'm scared", SentimentLabel::Fear, None, false);
        for _ in 0..3 {
            rig.transport
                .push_error(TransportError::Connection("refused".into()));
        }

        assert_eq!(
            rig.orchestrator.tick().await,
            TurnOutcome::Reacted {
                sentiment: SentimentLabel::Fear,
                emotion_delivered: false,
                reset_delivered: true,
            }
        );
        assert_eq!(rig.transport.calls_to("/receive"), 3);
        assert!(rig.journal.entries().contains(&"speak:end".to_string()));
        assert_eq!(rig.arbiter.stats().resumes, 1);
    }

    #[tokio::test]
    async fn undelivered_reset_still_resumes_tracking() {
        let mut rig = rig("leave me alone", SentimentLabel::Anger, None, false);
        rig.transport.push_status(200);
        rig.transport
            .push_error(TransportError::Timeout(Duration::from_secs(5)));
        rig.transport
            .push_error(TransportError::Connection("refused".into()));

        assert_eq!(
            rig.orchestrator.tick().await,
            TurnOutcome::Reacted {
                sentiment: SentimentLabel::Anger,
                emotion_delivered: true,
                reset_delivered: false,
            }
        );
        assert_eq!(rig.transport.calls_to("/receive"), 1);
        assert_eq!(rig.transport.calls_to("/reset"), 2);
        let stats = rig.arbiter.stats();
        assert_eq!((stats.pauses, stats.resumes), (1, 1));
        assert_eq!(rig.arbiter.mode().await, Mode::Tracking);
    }

    #[tokio::test]
    async fn failed_turn_forces_resume() {
        let mut rig = rig("this is unfair", SentimentLabel::Sad, None, true);
        let outcome = rig.orchestrator.tick().await;

        assert!(matches!(outcome, TurnOutcome::Failed(HarmonyError::Collaborator { .. })));
        assert_eq!(rig.orchestrator.delay_after(&outcome), fast_config().error_delay);
        assert_eq!(rig.arbiter.mode().await, Mode::Tracking);
        let stats = rig.arbiter.stats();
        assert_eq!((stats.pauses, stats.resumes), (1, 1));
        assert!(!rig.journal.entries().contains(&"speak:start".to_string()));
        assert_eq!(rig.transport.calls_to("/reset"), 0);
    }

    #[tokio::test]
    async fn capture_runs_both_sources() {
        let mut rig = rig("hello", SentimentLabel::Neutral, None, false);
        rig.orchestrator.tick().await;
        let entries = rig.journal.entries();
        assert!(entries.contains(&"frame".to_string()));
        assert!(entries.contains(&"utterance".to_string()));
        assert_eq!(rig.orchestrator.turns(), 1);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let rig = rig("  ", SentimentLabel::Neutral, None, false);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(rig.orchestrator.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert!(rig.journal.entries().iter().filter(|e| *e == "utterance").count() >= 2);
    }
}
