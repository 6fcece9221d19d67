//! Per-kind send policy.
//!
//! Each [`RequestKind`][harmony_types::RequestKind] owns one [`KindLimiter`]:
//! a minimum interval between accepted sends plus the timeout applied to
//! every network call of that kind.  The limiter's lock guards the interval
//! check and the timestamp update only; it is never held across I/O, so a
//! slow call on one lane cannot stall admission on another.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Static policy for one request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindPolicy {
    /// Minimum spacing between two accepted sends of this kind.
    pub min_interval: Duration,
    /// Timeout applied to each network call of this kind.
    pub timeout: Duration,
}

impl KindPolicy {
    /// Head tracking: heavily throttled, short timeout so a stalled link
    /// never blocks the perception loop.
    pub const HEAD: KindPolicy = KindPolicy {
        min_interval: Duration::from_secs(1),
        timeout: Duration::from_millis(1500),
    };

    /// Emotion signal: priority lane, effectively unthrottled.
    pub const EMOTION: KindPolicy = KindPolicy {
        min_interval: Duration::from_millis(100),
        timeout: Duration::from_secs(5),
    };

    /// Reset: same lane characteristics as emotion.
    pub const RESET: KindPolicy = KindPolicy {
        min_interval: Duration::from_millis(100),
        timeout: Duration::from_secs(5),
    };
}

/// Interval gate for one request kind.
#[derive(Debug)]
pub struct KindLimiter {
    policy: KindPolicy,
    last_accepted: Mutex<Option<Instant>>,
}

impl KindLimiter {
    pub fn new(policy: KindPolicy) -> Self {
        Self {
            policy,
            last_accepted: Mutex::new(None),
        }
    }

    /// Admit a send if at least `min_interval` has passed since the last
    /// admitted one, recording the admission time.  Returns `false` (and
    /// records nothing) otherwise.
    pub fn try_acquire(&self) -> bool {
        let mut last = self.last_accepted.lock();
        let now = Instant::now();
        match *last {
            Some(prev) if now.duration_since(prev) < self.policy.min_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Time remaining until the next send would be admitted.
    pub fn remaining(&self) -> Duration {
        match *self.last_accepted.lock() {
            Some(prev) => self.policy.min_interval.saturating_sub(prev.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// When the most recent send was admitted, if ever.
    pub fn last_accepted(&self) -> Option<Instant> {
        *self.last_accepted.lock()
    }

    pub fn policy(&self) -> KindPolicy {
        self.policy
    }
}
