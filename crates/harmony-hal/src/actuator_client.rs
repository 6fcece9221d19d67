//! [`ActuatorClient`] – the single funnel to the actuator controller.
//!
//! Three request kinds share one physical link:
//!
//! | Kind | Endpoint | Lane | Default interval | Default timeout |
//! |---|---|---|---|---|
//! | emotion | `POST /receive` | high priority | 100 ms | 5 s |
//! | head | `POST /head` | low priority | 1 s | 1.5 s |
//! | reset | `POST /reset` | high priority | 100 ms | 5 s |
//!
//! Lanes are independent: each kind has its own [`KindLimiter`].  A head
//! request that arrives while a high-priority call is in flight is dropped
//! rather than queued, since a stale head position is worse than none.
//!
//! Nothing here raises to the caller.  [`ActuatorClient::send`] returns a
//! [`SendOutcome`]; [`ActuatorClient::send_with_retry`] returns `bool`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use harmony_types::{ActuatorCommand, ActuatorRequest, Priority, RequestKind};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::rate_limit::{KindLimiter, KindPolicy};
use crate::transport::{Transport, TransportError};

// ─────────────────────────────────────────────────────────────────────────────
// Outcomes
// ─────────────────────────────────────────────────────────────────────────────

/// Why a request was deliberately not sent.  A skip is policy, not failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The kind's minimum interval has not elapsed.
    RateLimited,
    /// A high-priority call is in flight; low-priority traffic is dropped.
    PriorityInFlight,
    /// The arbiter is in `RESPONDING` mode.
    ModeResponding,
    /// Duplicate suppression is enabled and the value has not changed.
    Unchanged,
}

/// Result of a single send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The controller answered with a 2xx status.
    Delivered { status: u16 },
    /// The controller answered with a non-2xx status.
    Rejected { status: u16 },
    /// The call failed in transit.
    Failed(TransportError),
    /// The request could not be encoded; nothing was sent.
    Invalid(String),
    /// Policy skip; nothing was sent.
    Skipped(SkipReason),
}

impl SendOutcome {
    /// `false` only for policy skips.
    pub fn accepted(&self) -> bool {
        !matches!(self, SendOutcome::Skipped(_))
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, SendOutcome::Delivered { .. })
    }

    /// HTTP status, when the controller answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            SendOutcome::Delivered { status } | SendOutcome::Rejected { status } => Some(*status),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for [`ActuatorClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorConfig {
    pub emotion: KindPolicy,
    pub head: KindPolicy,
    pub reset: KindPolicy,
    /// Fixed delay between attempts in [`ActuatorClient::send_with_retry`].
    pub retry_delay: Duration,
    /// Path probed by [`ActuatorClient::test_reachable`].
    pub probe_path: String,
    pub probe_timeout: Duration,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            emotion: KindPolicy::EMOTION,
            head: KindPolicy::HEAD,
            reset: KindPolicy::RESET,
            retry_delay: Duration::from_secs(1),
            probe_path: "/health".to_string(),
            probe_timeout: Duration::from_secs(3),
        }
    }
}

/// Controller endpoint for each request kind.
pub fn endpoint(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::Emotion => "/receive",
        RequestKind::Head => "/head",
        RequestKind::Reset => "/reset",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ActuatorClient
// ─────────────────────────────────────────────────────────────────────────────

/// Priority- and kind-aware client for the actuator controller.
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct ActuatorClient {
    transport: Arc<dyn Transport>,
    emotion: KindLimiter,
    head: KindLimiter,
    reset: KindLimiter,
    retry_delay: Duration,
    probe_path: String,
    probe_timeout: Duration,
    priority_in_flight: AtomicUsize,
}

/// Decrements the in-flight counter when a priority call finishes, however
/// it finishes.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ActuatorClient {
    pub fn new(transport: Arc<dyn Transport>, config: ActuatorConfig) -> Self {
        Self {
            transport,
            emotion: KindLimiter::new(config.emotion),
            head: KindLimiter::new(config.head),
            reset: KindLimiter::new(config.reset),
            retry_delay: config.retry_delay,
            probe_path: config.probe_path,
            probe_timeout: config.probe_timeout,
            priority_in_flight: AtomicUsize::new(0),
        }
    }

    /// Send `command` once, subject to its kind's interval and priority
    /// rules, using the kind's default timeout.
    pub async fn send(&self, command: ActuatorCommand) -> SendOutcome {
        let timeout = self.lane(command.kind()).policy().timeout;
        self.send_with_timeout(command, timeout).await
    }

    /// Deliver `command`, retrying on timeout, connection failure, non-2xx
    /// status or policy skip, with a fixed delay between attempts.
    ///
    /// Returns `true` as soon as one attempt is delivered and `false` once
    /// `max_attempts` attempts have failed.  Never panics or raises.
    pub async fn send_with_retry(
        &self,
        command: ActuatorCommand,
        max_attempts: u32,
        per_attempt_timeout: Duration,
    ) -> bool {
        let kind = command.kind();
        for attempt in 1..=max_attempts {
            let outcome = self
                .send_with_timeout(command.clone(), per_attempt_timeout)
                .await;
            match outcome {
                SendOutcome::Delivered { status } => {
                    info!(%kind, attempt, status, "actuator command delivered");
                    return true;
                }
                SendOutcome::Invalid(reason) => {
                    // Re-encoding the same command cannot succeed.
                    warn!(%kind, %reason, "actuator command is invalid; not retrying");
                    return false;
                }
                other => {
                    warn!(%kind, attempt, max_attempts, outcome = ?other, "actuator command not delivered");
                }
            }
            if attempt < max_attempts {
                // Never wake up inside the lane's interval only to be skipped.
                let wait = self.retry_delay.max(self.lane(kind).remaining());
                tokio::time::sleep(wait).await;
            }
        }
        warn!(%kind, max_attempts, "actuator command failed after all attempts");
        false
    }

    /// Single short-timeout reachability probe.
    pub async fn test_reachable(&self) -> bool {
        match self.transport.get(&self.probe_path, self.probe_timeout).await {
            Ok(status) if is_success(status) => true,
            Ok(status) => {
                warn!(path = %self.probe_path, status, "actuator controller probe rejected");
                false
            }
            Err(e) => {
                warn!(path = %self.probe_path, error = %e, "actuator controller unreachable");
                false
            }
        }
    }

    /// When the last send of `kind` was admitted by its limiter.
    pub fn last_accepted(&self, kind: RequestKind) -> Option<Instant> {
        self.lane(kind).last_accepted()
    }

    pub fn policy(&self, kind: RequestKind) -> KindPolicy {
        self.lane(kind).policy()
    }

    /// `true` while an emotion or reset call is on the wire.
    pub fn priority_in_flight(&self) -> bool {
        self.priority_in_flight.load(Ordering::Acquire) > 0
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    async fn send_with_timeout(&self, command: ActuatorCommand, timeout: Duration) -> SendOutcome {
        let request = ActuatorRequest::new(command);
        let kind = request.kind();

        let body = match request.command().wire_body() {
            Ok(body) => body,
            Err(e) => return SendOutcome::Invalid(e.to_string()),
        };

        // Checked before the limiter so a dropped head update does not burn
        // its lane's interval.
        if request.priority() == Priority::Low && self.priority_in_flight() {
            debug!(%kind, "dropping low-priority request; priority lane busy");
            return SendOutcome::Skipped(SkipReason::PriorityInFlight);
        }

        if !self.lane(kind).try_acquire() {
            debug!(%kind, "skipping request; minimum interval not elapsed");
            return SendOutcome::Skipped(SkipReason::RateLimited);
        }

        let _guard = (request.priority() == Priority::High)
            .then(|| InFlight::enter(&self.priority_in_flight));

        self.dispatch(kind, &body, timeout).await
    }

    async fn dispatch(&self, kind: RequestKind, body: &Value, timeout: Duration) -> SendOutcome {
        match self.transport.post_json(endpoint(kind), body, timeout).await {
            Ok(status) if is_success(status) => SendOutcome::Delivered { status },
            Ok(status) => SendOutcome::Rejected { status },
            Err(e) => SendOutcome::Failed(e),
        }
    }

    fn lane(&self, kind: RequestKind) -> &KindLimiter {
        match kind {
            RequestKind::Emotion => &self.emotion,
            RequestKind::Head => &self.head,
            RequestKind::Reset => &self.reset,
        }
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}
