//! Adaptive per-target delay with a circuit-break.

use crate::config::{RateLimit, MAX_FAILURE_FACTOR};
use crate::types::FetchOutcome;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Snapshot of one target's backoff state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateState {
    pub delay: Duration,
    pub floor: Duration,
    pub ceiling: Duration,
    /// Throttles seen since the last success.
    pub consecutive_failures: u32,
    /// Transport failures seen since the last success.
    pub transport_failures: u32,
}

/// Owns the delay between requests to one target.
///
/// Throttles double the delay up to the ceiling and successes divide it by 1.5 down to
/// the floor. Transport failures apply the configured `failure_factor` instead. After
/// `failure_threshold` consecutive throttles, or `failure_budget` consecutive
/// transport failures, the controller reports itself exhausted for the rest of the run.
#[derive(Debug)]
pub struct RateController {
    state: Mutex<RateState>,
    failure_threshold: u32,
    failure_budget: u32,
    failure_factor: f64,
}

impl RateController {
    pub fn new(limits: &RateLimit) -> Self {
        let floor = limits.floor();
        let ceiling = limits.ceiling().max(floor);
        Self {
            state: Mutex::new(RateState {
                delay: limits.initial().clamp(floor, ceiling),
                floor,
                ceiling,
                consecutive_failures: 0,
                transport_failures: 0,
            }),
            failure_threshold: limits.failure_threshold.max(1),
            failure_budget: limits.failure_budget.max(1),
            failure_factor: if limits.failure_factor.is_finite() {
                limits.failure_factor.clamp(1.0, MAX_FAILURE_FACTOR)
            } else {
                MAX_FAILURE_FACTOR
            },
        }
    }

    fn lock(&self) -> MutexGuard<'_, RateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Feeds the outcome of one request back into the delay.
    pub fn observe(&self, outcome: &FetchOutcome) {
        let mut state = self.lock();
        match outcome {
            FetchOutcome::Throttled => {
                state.delay = state.delay.checked_mul(2).unwrap_or(state.ceiling).min(state.ceiling);
                state.consecutive_failures += 1;
            }
            FetchOutcome::Success(_) => {
                // delay / 1.5
                state.delay = (state.delay * 2 / 3).max(state.floor);
                state.consecutive_failures = 0;
                state.transport_failures = 0;
            }
            FetchOutcome::Failed(_) => {
                let scaled = state.delay.as_secs_f64() * self.failure_factor;
                state.delay = Duration::try_from_secs_f64(scaled)
                    .map_or(state.ceiling, |delay| delay.min(state.ceiling));
                state.transport_failures += 1;
            }
        }
        debug!(
            delay_ms = state.delay.as_millis() as u64,
            throttles = state.consecutive_failures,
            failures = state.transport_failures,
            "Rate state updated"
        );
        if self.exhausted_state(&state) {
            warn!(
                throttles = state.consecutive_failures,
                failures = state.transport_failures,
                "Target circuit-broken"
            );
        }
    }

    pub fn current_delay(&self) -> Duration {
        self.lock().delay
    }

    pub fn state(&self) -> RateState {
        self.lock().clone()
    }

    /// Whether the target must not receive any further request this run.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted_state(&self.lock())
    }

    fn exhausted_state(&self, state: &RateState) -> bool {
        state.consecutive_failures >= self.failure_threshold
            || state.transport_failures >= self.failure_budget
    }

    /// Suspends the caller for the current delay.
    pub async fn wait(&self) {
        let delay = self.current_delay();
        sleep(delay).await;
    }
}
