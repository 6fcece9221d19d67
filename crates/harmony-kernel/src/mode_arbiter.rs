//! [`ModeArbiter`] – mutual exclusion between head tracking and reactions.
//!
//! The arbiter owns the system [`Mode`].  While `TRACKING`, perception
//! requests pass through to the [`ActuatorClient`]; while `RESPONDING` they
//! are skipped without touching the network.
//!
//! The mode check and the forwarded send run under the same async lock, so
//! [`ModeArbiter::pause`] cannot return while a head update is still on the
//! wire.  Once `pause` returns, no perception traffic reaches the transport
//! until [`ModeArbiter::resume`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use harmony_hal::{ActuatorClient, ActuatorConfig, SendOutcome, SimTransport, SkipReason};
//! use harmony_kernel::ModeArbiter;
//! use harmony_types::ActuatorCommand;
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! rt.block_on(async {
//!     let transport = Arc::new(SimTransport::new());
//!     let client = Arc::new(ActuatorClient::new(transport.clone(), ActuatorConfig::default()));
//!     let arbiter = ModeArbiter::new(client, false);
//!
//!     arbiter.pause().await;
//!     let outcome = arbiter.guarded_forward(ActuatorCommand::head_count(2)).await;
//!     assert_eq!(outcome, SendOutcome::Skipped(SkipReason::ModeResponding));
//!     assert_eq!(transport.calls_to("/head"), 0);
//! });
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use harmony_hal::{ActuatorClient, SendOutcome, SkipReason};
use harmony_types::{ActuatorCommand, Mode};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArbiterStats {
    /// `TRACKING → RESPONDING` transitions.
    pub pauses: u64,
    /// `RESPONDING → TRACKING` transitions.
    pub resumes: u64,
    /// Requests handed to the actuator client.
    pub forwarded: u64,
    /// Requests dropped by the arbiter itself.
    pub skipped: u64,
}

#[derive(Debug, Default)]
struct ArbiterState {
    mode: Mode,
    /// Last head count delivered while tracking.
    baseline: Option<u32>,
}

/// The `TRACKING` / `RESPONDING` gate in front of the actuator client.
pub struct ModeArbiter {
    state: Mutex<ArbiterState>,
    client: Arc<ActuatorClient>,
    suppress_unchanged: bool,
    pauses: AtomicU64,
    resumes: AtomicU64,
    forwarded: AtomicU64,
    skipped: AtomicU64,
}

impl ModeArbiter {
    /// Create an arbiter in `TRACKING` mode.
    ///
    /// With `suppress_unchanged`, a head count equal to the last delivered
    /// one is skipped as [`SkipReason::Unchanged`].
    pub fn new(client: Arc<ActuatorClient>, suppress_unchanged: bool) -> Self {
        Self {
            state: Mutex::new(ArbiterState::default()),
            client,
            suppress_unchanged,
            pauses: AtomicU64::new(0),
            resumes: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    /// Enter `RESPONDING`.  Idempotent.
    ///
    /// Waits for any forwarded request still in flight.  Pending head state
    /// is discarded.
    pub async fn pause(&self) {
        let mut state = self.state.lock().await;
        if state.mode == Mode::Responding {
            debug!("arbiter already responding");
            return;
        }
        state.mode = Mode::Responding;
        state.baseline = None;
        self.pauses.fetch_add(1, Ordering::Relaxed);
        info!(mode = %state.mode, "perception paused");
    }

    /// Return to `TRACKING` and reset the duplicate-suppression baseline.
    /// Idempotent.
    pub async fn resume(&self) {
        let mut state = self.state.lock().await;
        state.baseline = None;
        if state.mode == Mode::Tracking {
            debug!("arbiter already tracking");
            return;
        }
        state.mode = Mode::Tracking;
        self.resumes.fetch_add(1, Ordering::Relaxed);
        info!(mode = %state.mode, "perception resumed");
    }

    /// Forward `command` to the actuator client if the arbiter is tracking.
    ///
    /// The lock is held for the whole send.
    pub async fn guarded_forward(&self, command: ActuatorCommand) -> SendOutcome {
        let mut state = self.state.lock().await;

        if state.mode == Mode::Responding {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            debug!(kind = %command.kind(), "forward skipped while responding");
            return SendOutcome::Skipped(SkipReason::ModeResponding);
        }

        let count = match &command {
            ActuatorCommand::Head { number, .. } => *number,
            _ => None,
        };
        if self.suppress_unchanged && count.is_some() && count == state.baseline {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            debug!(?count, "head count unchanged; not forwarding");
            return SendOutcome::Skipped(SkipReason::Unchanged);
        }

        self.forwarded.fetch_add(1, Ordering::Relaxed);
        let outcome = self.client.send(command).await;
        if outcome.is_delivered() && count.is_some() {
            state.baseline = count;
        }
        outcome
    }

    pub async fn mode(&self) -> Mode {
        self.state.lock().await.mode
    }

    /// Last head count delivered since the most recent resume.
    pub async fn baseline(&self) -> Option<u32> {
        self.state.lock().await.baseline
    }

    pub fn stats(&self) -> ArbiterStats {
        ArbiterStats {
            pauses: self.pauses.load(Ordering::Relaxed),
            resumes: self.resumes.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}
