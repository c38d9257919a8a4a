//! Circuit breaker guarding calls to a remote store
//!
//! After `threshold` consecutive failures the breaker opens and rejects calls
//! for `cooldown`. It then lets exactly one probe through; the probe's result
//! closes it again or re-opens it for another cooldown.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed { failures: u32 },
    Open { until: Instant },
    /// A probe is in flight; a probe that never reports back is replaced
    /// after another cooldown
    HalfOpen { since: Instant },
}

#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN)
    }
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            state: Mutex::new(BreakerState::Closed { failures: 0 }),
        }
    }

    pub fn state(&self) -> BreakerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a call may proceed. Moving from open to half-open hands out
    /// the single probe permit.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { until } if Instant::now() >= until => {
                *state = BreakerState::HalfOpen {
                    since: Instant::now(),
                };
                true
            }
            BreakerState::HalfOpen { since } if since.elapsed() >= self.cooldown => {
                *state = BreakerState::HalfOpen {
                    since: Instant::now(),
                };
                true
            }
            BreakerState::Open { .. } | BreakerState::HalfOpen { .. } => false,
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, BreakerState::HalfOpen { .. }) {
            info!("Store probe succeeded, closing circuit");
        }
        *state = BreakerState::Closed { failures: 0 };
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let open = BreakerState::Open {
            until: Instant::now() + self.cooldown,
        };
        match *state {
            BreakerState::Closed { failures } if failures + 1 >= self.threshold => {
                warn!(
                    failures = failures + 1,
                    cooldown_secs = self.cooldown.as_secs(),
                    "Store failing, opening circuit"
                );
                *state = open;
            }
            BreakerState::Closed { failures } => {
                *state = BreakerState::Closed {
                    failures: failures + 1,
                };
            }
            BreakerState::HalfOpen { .. } => {
                warn!("Store probe failed, re-opening circuit");
                *state = open;
            }
            BreakerState::Open { .. } => {}
        }
    }
}
