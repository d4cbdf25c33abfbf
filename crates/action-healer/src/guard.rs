//! Remote-provider guard: call budget per rolling window, per-step cap and a
//! circuit breaker.
//!
//! Admission and accounting happen under one lock, so a call is never
//! dispatched on a decision another caller has already invalidated.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use soulbrowser_policy_center::validate::validate_remote;
use soulbrowser_policy_center::RemoteGuardPolicy;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::errors::HealError;

/// Why a remote call was not admitted. A deliberate skip, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardRejection {
    RateLimited { retry_after_ms: u64 },
    StepCapReached { step: String, attempts: u32 },
    CircuitOpen { retry_after_ms: u64 },
}

impl fmt::Display for GuardRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardRejection::RateLimited { retry_after_ms } => {
                write!(f, "remote call budget exhausted, retry in {}ms", retry_after_ms)
            }
            GuardRejection::StepCapReached { step, attempts } => {
                write!(f, "step {} already used {} remote attempts this run", step, attempts)
            }
            GuardRejection::CircuitOpen { retry_after_ms } => {
                write!(f, "circuit open, retry in {}ms", retry_after_ms)
            }
        }
    }
}

/// Sliding-window call budget plus a per-step attempt cap.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_calls: usize,
    per_step: u32,
    calls: VecDeque<Instant>,
    step_attempts: HashMap<String, u32>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_calls: usize, per_step: u32) -> Self {
        Self {
            window,
            max_calls,
            per_step,
            calls: VecDeque::new(),
            step_attempts: HashMap::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.calls.front() {
            if now.duration_since(*front) >= self.window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn check(&mut self, step: &str, now: Instant) -> Result<(), GuardRejection> {
        let attempts = self.step_attempts.get(step).copied().unwrap_or(0);
        if attempts >= self.per_step {
            return Err(GuardRejection::StepCapReached {
                step: step.to_string(),
                attempts,
            });
        }
        self.prune(now);
        if self.calls.len() >= self.max_calls {
            let retry_after = self
                .calls
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.window);
            return Err(GuardRejection::RateLimited {
                retry_after_ms: retry_after.as_millis() as u64,
            });
        }
        Ok(())
    }

    pub fn record(&mut self, step: &str, now: Instant) {
        self.calls.push_back(now);
        *self.step_attempts.entry(step.to_string()).or_insert(0) += 1;
    }

    pub fn calls_in_window(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.calls.len()
    }

    pub fn step_attempts(&self, step: &str) -> u32 {
        self.step_attempts.get(step).copied().unwrap_or(0)
    }

    pub fn reset_steps(&mut self) {
        self.step_attempts.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open { since: Instant },
    /// Cooldown elapsed; `trial_started` is set once the single trial call
    /// has been admitted.
    HalfOpen { trial_started: Option<Instant> },
}

impl CircuitState {
    pub fn name(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open { .. } => "open",
            CircuitState::HalfOpen { .. } => "half_open",
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    state: CircuitState,
    consecutive_failures: u32,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            state: CircuitState::Closed,
            consecutive_failures: 0,
        }
    }

    /// State as seen at `now`. An open circuit whose cooldown elapsed reads
    /// as half-open with no trial yet. So does a trial that never reported
    /// within a cooldown: it counts as a failure at the moment it started.
    pub fn state_at(&self, now: Instant) -> CircuitState {
        match self.state {
            CircuitState::Open { since } | CircuitState::HalfOpen {
                trial_started: Some(since),
            } if now.duration_since(since) >= self.cooldown => CircuitState::HalfOpen {
                trial_started: None,
            },
            state => state,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn remaining(&self, since: Instant, now: Instant) -> u64 {
        self.cooldown
            .saturating_sub(now.duration_since(since))
            .as_millis() as u64
    }

    /// Side-effect free admission check.
    pub fn check(&self, now: Instant) -> Result<(), GuardRejection> {
        match self.state_at(now) {
            CircuitState::Closed | CircuitState::HalfOpen { trial_started: None } => Ok(()),
            CircuitState::Open { since }
            | CircuitState::HalfOpen {
                trial_started: Some(since),
            } => Err(GuardRejection::CircuitOpen {
                retry_after_ms: self.remaining(since, now),
            }),
        }
    }

    /// Take the call slot; in half-open this claims the single trial.
    pub fn acquire(&mut self, now: Instant) -> Result<(), GuardRejection> {
        self.check(now)?;
        if let CircuitState::HalfOpen { .. } = self.state_at(now) {
            if let CircuitState::HalfOpen {
                trial_started: Some(_),
            } = self.state
            {
                warn!("previous trial call never reported, treating it as failed");
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            }
            info!("circuit half-open, admitting trial call");
            self.state = CircuitState::HalfOpen {
                trial_started: Some(now),
            };
        }
        Ok(())
    }

    pub fn record_success(&mut self) {
        if matches!(self.state, CircuitState::HalfOpen { .. }) {
            info!("trial call succeeded, circuit closed");
        }
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        match self.state {
            CircuitState::HalfOpen { .. } => {
                warn!("trial call failed, circuit reopened");
                self.state = CircuitState::Open { since: now };
            }
            CircuitState::Closed if self.consecutive_failures >= self.failure_threshold => {
                warn!(
                    failures = self.consecutive_failures,
                    cooldown_secs = self.cooldown.as_secs(),
                    "circuit opened"
                );
                self.state = CircuitState::Open { since: now };
            }
            _ => {}
        }
    }
}

struct GuardInner {
    limiter: RateLimiter,
    breaker: CircuitBreaker,
}

/// Rate limiter and circuit breaker behind a single lock.
pub struct RemoteGuard {
    inner: Mutex<GuardInner>,
}

impl RemoteGuard {
    pub fn new(policy: &RemoteGuardPolicy) -> Result<Self, HealError> {
        validate_remote(policy)?;
        Ok(Self::build(policy))
    }

    fn build(policy: &RemoteGuardPolicy) -> Self {
        Self {
            inner: Mutex::new(GuardInner {
                limiter: RateLimiter::new(
                    policy.window(),
                    policy.max_calls,
                    policy.per_step_attempts,
                ),
                breaker: CircuitBreaker::new(policy.failure_threshold, policy.cooldown()),
            }),
        }
    }

    /// Admit one remote dispatch for `step`, accounting for it atomically.
    pub fn admit(&self, step: &str) -> Result<(), GuardRejection> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.breaker.check(now)?;
        inner.limiter.check(step, now)?;
        inner.breaker.acquire(now)?;
        inner.limiter.record(step, now);
        Ok(())
    }

    /// Feed the result of an admitted dispatch back into the breaker.
    pub fn record_outcome(&self, success: bool) {
        let mut inner = self.inner.lock();
        if success {
            inner.breaker.record_success();
        } else {
            inner.breaker.record_failure(Instant::now());
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.inner.lock().breaker.state_at(Instant::now())
    }

    pub fn calls_in_window(&self) -> usize {
        self.inner.lock().limiter.calls_in_window(Instant::now())
    }

    pub fn step_attempts(&self, step: &str) -> u32 {
        self.inner.lock().limiter.step_attempts(step)
    }

    /// Forget per-step counters; called at the start of each run.
    pub fn reset_run(&self) {
        self.inner.lock().limiter.reset_steps();
    }
}

impl Default for RemoteGuard {
    fn default() -> Self {
        Self::build(&RemoteGuardPolicy::default())
    }
}
