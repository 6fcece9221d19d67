//! [`PerceptionLoop`] – keeps the head pointed at whoever is nearby.
//!
//! Each iteration:
//!
//! 1. **Gate** – if the arbiter is `RESPONDING`, do nothing this round.
//! 2. **Read** – take a fresh snapshot from the [`FrameCache`].  A missing or
//!    stale frame is a *miss*; after `miss_threshold` consecutive misses the
//!    next sleep is the longer `miss_backoff`.
//! 3. **Count** – run the [`PersonDetector`] and keep confident people only.
//! 4. **Forward** – submit `{"number": count}` through
//!    [`ModeArbiter::guarded_forward`].
//!
//! The loop then sleeps `interval` whatever happened, and never terminates
//! on its own; it stops when its [`CancellationToken`] fires.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use harmony_hal::{FrameCache, SendOutcome};
use harmony_kernel::ModeArbiter;
use harmony_types::{ActuatorCommand, HarmonyError, Mode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::detection::{DEFAULT_CONFIDENCE_THRESHOLD, PersonDetector, count_people};

/// Tunables for [`PerceptionLoop`].
#[derive(Debug, Clone, PartialEq)]
pub struct PerceptionConfig {
    /// Sleep between iterations.
    pub interval: Duration,
    /// Consecutive misses before the longer backoff applies.
    pub miss_threshold: u32,
    /// Sleep after `miss_threshold` consecutive misses.
    pub miss_backoff: Duration,
    /// Detections at or below this confidence are ignored.
    pub confidence_threshold: f32,
    /// Frames older than this are treated as missing.
    pub max_frame_age: Duration,
    /// Settle delay before the first iteration.
    pub startup_delay: Duration,
    /// Send `{"number": 0}` once at start so the head begins moving.
    pub initial_nudge: bool,
    /// Minimum spacing between repeated warnings of the same kind.
    pub warn_every: Duration,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            miss_threshold: 5,
            miss_backoff: Duration::from_secs(5),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            max_frame_age: Duration::from_secs(2),
            startup_delay: Duration::from_secs(2),
            initial_nudge: true,
            warn_every: Duration::from_secs(30),
        }
    }
}

/// What one iteration did.
#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    /// The arbiter is `RESPONDING`; nothing was read or sent.
    Paused,
    /// No usable frame.  `escalated` is set on the iteration that reached
    /// the miss threshold.
    NoFrame { consecutive_misses: u32, escalated: bool },
    /// The detector failed; no request was generated.
    DetectorFailed(HarmonyError),
    /// A head update was submitted to the arbiter.
    Forwarded { count: u32, outcome: SendOutcome },
}

/// The continuous head-tracking producer.
pub struct PerceptionLoop {
    cache: Arc<FrameCache>,
    detector: Arc<dyn PersonDetector>,
    arbiter: Arc<ModeArbiter>,
    config: PerceptionConfig,
    misses: u32,
    warnings: Option<DefaultDirectRateLimiter>,
}

impl PerceptionLoop {
    pub fn new(
        cache: Arc<FrameCache>,
        detector: Arc<dyn PersonDetector>,
        arbiter: Arc<ModeArbiter>,
        config: PerceptionConfig,
    ) -> Self {
        // Burst of one: the first warning of a streak always gets through.
        let warnings = Quota::with_period(config.warn_every)
            .map(|q| RateLimiter::direct(q.allow_burst(NonZeroU32::MIN)));
        Self {
            cache,
            detector,
            arbiter,
            config,
            misses: 0,
            warnings,
        }
    }

    pub fn config(&self) -> &PerceptionConfig {
        &self.config
    }

    /// Consecutive misses so far.
    pub fn misses(&self) -> u32 {
        self.misses
    }

    /// Send the start-up `{"number": 0}` head update through the arbiter.
    pub async fn nudge(&self) -> SendOutcome {
        let outcome = self
            .arbiter
            .guarded_forward(ActuatorCommand::head_count(0))
            .await;
        if outcome.is_delivered() {
            info!("initial head movement triggered");
        } else {
            warn!(?outcome, "initial head movement not delivered");
        }
        outcome
    }

    /// Run one iteration without sleeping.
    pub async fn run_iteration(&mut self) -> IterationOutcome {
        if self.arbiter.mode().await == Mode::Responding {
            return IterationOutcome::Paused;
        }

        let Some(frame) = self.cache.get_fresh(self.config.max_frame_age) else {
            self.misses += 1;
            let escalated = self.misses >= self.config.miss_threshold;
            if escalated {
                warn!(
                    misses = self.misses,
                    backoff = ?self.config.miss_backoff,
                    "no camera frame; backing off"
                );
                let consecutive_misses = self.misses;
                self.misses = 0;
                return IterationOutcome::NoFrame {
                    consecutive_misses,
                    escalated,
                };
            }
            debug!(misses = self.misses, "no fresh frame");
            return IterationOutcome::NoFrame {
                consecutive_misses: self.misses,
                escalated,
            };
        };
        self.misses = 0;

        let detections = match self.detector.detect(&frame).await {
            Ok(d) => d,
            Err(e) => {
                if self.should_warn() {
                    warn!(error = %e, "person detection failed");
                } else {
                    debug!(error = %e, "person detection failed");
                }
                return IterationOutcome::DetectorFailed(e);
            }
        };

        let count = count_people(&detections, self.config.confidence_threshold);
        let outcome = self
            .arbiter
            .guarded_forward(ActuatorCommand::head_count(count))
            .await;
        match &outcome {
            SendOutcome::Delivered { .. } => debug!(count, "head update delivered"),
            SendOutcome::Skipped(reason) => debug!(count, ?reason, "head update skipped"),
            SendOutcome::Rejected { status } if self.should_warn() => {
                warn!(count, status, "head update rejected");
            }
            SendOutcome::Failed(e) if self.should_warn() => {
                warn!(count, error = %e, "head update failed");
            }
            other => debug!(count, outcome = ?other, "head update not delivered"),
        }
        IterationOutcome::Forwarded { count, outcome }
    }

    /// Sleep to apply after `outcome`.
    pub fn delay_after(&self, outcome: &IterationOutcome) -> Duration {
        match outcome {
            IterationOutcome::NoFrame {
                escalated: true, ..
            } => self.config.miss_backoff,
            _ => self.config.interval,
        }
    }

    /// Loop until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(interval = ?self.config.interval, "perception loop started");

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("perception loop cancelled before start");
                return;
            }
            _ = tokio::time::sleep(self.config.startup_delay) => {}
        }
        if self.config.initial_nudge {
            self.nudge().await;
        }

        loop {
            let outcome = self.run_iteration().await;
            let delay = self.delay_after(&outcome);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!("perception loop stopped");
    }

    fn should_warn(&self) -> bool {
        self.warnings.as_ref().is_none_or(|l| l.check().is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{Detection, StaticDetector};
    use harmony_hal::{ActuatorClient, ActuatorConfig, KindPolicy, SimTransport, SkipReason};
    use harmony_types::Frame;
    use serde_json::json;

    struct Rig {
        cache: Arc<FrameCache>,
        detector: Arc<StaticDetector>,
        arbiter: Arc<ModeArbiter>,
        transport: Arc<SimTransport>,
    }

    fn rig(detections: Vec<Detection>) -> Rig {
        let transport = Arc::new(SimTransport::new());
        let client = Arc::new(ActuatorClient::new(
            transport.clone(),
            ActuatorConfig {
                head: KindPolicy {
                    min_interval: Duration::ZERO,
                    timeout: Duration::from_secs(1),
                },
                ..ActuatorConfig::default()
            },
        ));
        Rig {
            cache: Arc::new(FrameCache::new()),
            detector: Arc::new(StaticDetector::new(detections)),
            arbiter: Arc::new(ModeArbiter::new(client, false)),
            transport,
        }
    }

    fn perception(rig: &Rig, config: PerceptionConfig) -> PerceptionLoop {
        PerceptionLoop::new(
            rig.cache.clone(),
            rig.detector.clone(),
            rig.arbiter.clone(),
            config,
        )
    }

    fn frame() -> Frame {
        Frame::new(2, 2, vec![0u8; 12])
    }

    #[tokio::test]
    async fn empty_cache_escalates_on_fifth_miss() {
        let rig = rig(Vec::new());
        let mut p = perception(&rig, PerceptionConfig::default());

        for expected in 1..=4 {
            let outcome = p.run_iteration().await;
            assert_eq!(
                outcome,
                IterationOutcome::NoFrame {
                    consecutive_misses: expected,
                    escalated: false
                }
            );
            assert_eq!(p.delay_after(&outcome), Duration::from_secs(1));
        }
        let fifth = p.run_iteration().await;
        assert_eq!(
            fifth,
            IterationOutcome::NoFrame {
                consecutive_misses: 5,
                escalated: true
            }
        );
        assert_eq!(p.delay_after(&fifth), Duration::from_secs(5));

        // Counter starts over after the long backoff.
        assert_eq!(
            p.run_iteration().await,
            IterationOutcome::NoFrame {
                consecutive_misses: 1,
                escalated: false
            }
        );
        assert_eq!(rig.detector.calls(), 0);
        assert!(rig.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn frame_present_forwards_confident_count() {
        let rig = rig(vec![
            Detection::person(0.9),
            Detection::person(0.4),
            Detection {
                class_id: 56,
                confidence: 0.9,
            },
        ]);
        rig.cache.put(frame());
        let mut p = perception(&rig, PerceptionConfig::default());

        let outcome = p.run_iteration().await;
        assert_eq!(
            outcome,
            IterationOutcome::Forwarded {
                count: 1,
                outcome: SendOutcome::Delivered { status: 200 }
            }
        );
        assert_eq!(rig.transport.bodies_to("/head"), vec![json!({"number": 1})]);
    }

    #[tokio::test]
    async fn a_frame_resets_the_miss_counter() {
        let rig = rig(Vec::new());
        let mut p = perception(&rig, PerceptionConfig::default());
        p.run_iteration().await;
        p.run_iteration().await;
        assert_eq!(p.misses(), 2);
        rig.cache.put(frame());
        p.run_iteration().await;
        assert_eq!(p.misses(), 0);
    }

    #[tokio::test]
    async fn stale_frame_counts_as_miss() {
        let rig = rig(vec![Detection::person(0.9)]);
        rig.cache
            .put(Frame::with_age(2, 2, vec![0u8; 12], Duration::from_secs(10)));
        let mut p = perception(&rig, PerceptionConfig::default());
        assert!(matches!(
            p.run_iteration().await,
            IterationOutcome::NoFrame { .. }
        ));
        assert!(rig.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn responding_sends_nothing() {
        let rig = rig(vec![Detection::person(0.9)]);
        rig.cache.put(frame());
        rig.arbiter.pause().await;
        let mut p = perception(&rig, PerceptionConfig::default());

        for _ in 0..3 {
            assert_eq!(p.run_iteration().await, IterationOutcome::Paused);
        }
        assert!(rig.transport.calls().is_empty());
        assert_eq!(rig.detector.calls(), 0);

        rig.arbiter.resume().await;
        assert!(matches!(
            p.run_iteration().await,
            IterationOutcome::Forwarded { count: 1, .. }
        ));
    }

    #[tokio::test]
    async fn detector_failure_skips_iteration() {
        let rig = rig(Vec::new());
        rig.detector
            .fail_with(HarmonyError::collaborator("detect", "model not loaded"));
        rig.cache.put(frame());
        let mut p = perception(&rig, PerceptionConfig::default());

        let outcome = p.run_iteration().await;
        assert!(matches!(outcome, IterationOutcome::DetectorFailed(_)));
        assert_eq!(p.delay_after(&outcome), Duration::from_secs(1));
        assert!(rig.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn nudge_goes_through_the_arbiter() {
        let rig = rig(Vec::new());
        let p = perception(&rig, PerceptionConfig::default());
        rig.arbiter.pause().await;
        assert_eq!(
            p.nudge().await,
            SendOutcome::Skipped(SkipReason::ModeResponding)
        );
        rig.arbiter.resume().await;
        assert!(p.nudge().await.is_delivered());
        assert_eq!(rig.transport.bodies_to("/head"), vec![json!({"number": 0})]);
    }

    #[tokio::test]
    async fn run_nudges_then_tracks_until_cancelled() {
        let rig = rig(vec![Detection::person(0.95), Detection::person(0.9)]);
        rig.cache.put(frame());
        let p = perception(
            &rig,
            PerceptionConfig {
                interval: Duration::from_millis(10),
                startup_delay: Duration::from_millis(5),
                ..PerceptionConfig::default()
            },
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(p.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(80)).await;
        cancel.cancel();
        handle.await.unwrap();

        let bodies = rig.transport.bodies_to("/head");
        assert!(bodies.len() >= 2);
        assert_eq!(bodies[0], json!({"number": 0}));
        assert_eq!(bodies[1], json!({"number": 2}));
    }
}
