//! Per-handler circuit breaker
//!
//! Closed admits every call; open rejects until a cooldown elapses; half-open
//! admits a single trial call. A trial success closes the breaker, a trial
//! failure re-opens it. State is mutex-guarded: multiple workers may drive
//! the same handler id concurrently.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::domain::CircuitBreakerThreshold;
use crate::registry::HandlerId;

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation.
    Closed,
    /// Rejecting calls until the cooldown elapses.
    Open,
    /// Admitting one trial call.
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Circuit breaker guarding one handler id.
#[derive(Debug)]
pub struct CircuitBreaker {
    handler_id: HandlerId,
    threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(
        handler_id: HandlerId,
        threshold: CircuitBreakerThreshold,
        cooldown: Duration,
    ) -> Self {
        Self {
            handler_id,
            threshold: threshold.as_u32(),
            cooldown,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Asks for admission. `false` means the caller must skip the handler
    /// invocation and report a fallback.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let cooled_down = inner
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.cooldown);
                if cooled_down {
                    inner.state = BreakerState::HalfOpen;
                    inner.trial_in_flight = true;
                    warn!(handler = %self.handler_id, "circuit breaker half-open, admitting trial call");
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Records a successful invocation, closing the breaker.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != BreakerState::Closed {
            warn!(handler = %self.handler_id, "circuit breaker closed after successful trial");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }

    /// Records a failed invocation; opens the breaker at the threshold and
    /// re-opens it on a failed trial.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let should_open = inner.state == BreakerState::HalfOpen
            || inner.consecutive_failures >= self.threshold;
        if should_open && inner.state != BreakerState::Open {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
            inner.trial_in_flight = false;
            warn!(
                handler = %self.handler_id,
                failures = inner.consecutive_failures,
                "circuit breaker opened"
            );
        } else if should_open {
            // Already open; refresh the cooldown window.
            inner.opened_at = Some(Instant::now());
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }
}
