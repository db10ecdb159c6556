use crate::{Error, Result};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub failure_threshold: u32,
    pub open_timeout_ms: u64,
    pub consecutive_failures: u32,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure threshold (values below 1 behave as 1)
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set how long the circuit stays open before letting a probe through
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }
}

#[derive(Debug)]
struct State {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

/// Three-state circuit breaker guarding one handler.
///
/// - Closed: calls pass, consecutive failures are counted
/// - Open: calls are refused until `open_timeout` has passed since the last failure
/// - HalfOpen: calls pass; the next success closes, the next failure re-opens
pub struct CircuitBreaker {
    cfg: CircuitBreakerConfig,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        Self {
            cfg,
            state: Mutex::new(State {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn threshold(&self) -> u32 {
        self.cfg.failure_threshold.max(1)
    }

    /// Whether a call may proceed. An open circuit whose timeout has elapsed
    /// moves to half-open and lets the call through.
    pub fn allow(&self) -> bool {
        let mut st = self.lock();
        match st.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = st
                    .last_failure
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed < self.cfg.open_timeout {
                    return false;
                }
                st.state = CircuitState::HalfOpen;
                debug!("circuit breaker half-open");
                true
            }
        }
    }

    /// Like [`CircuitBreaker::allow`], but as a `Result`.
    pub fn check(&self) -> Result<()> {
        if self.allow() {
            Ok(())
        } else {
            Err(Error::CircuitOpen)
        }
    }

    pub fn record_success(&self) {
        let mut st = self.lock();
        if st.state != CircuitState::Closed {
            debug!("circuit breaker closed");
        }
        st.consecutive_failures = 0;
        st.state = CircuitState::Closed;
    }

    pub fn record_failure(&self) {
        let threshold = self.threshold();
        let mut st = self.lock();
        match st.state {
            CircuitState::HalfOpen => {
                st.consecutive_failures = threshold;
                st.last_failure = Some(Instant::now());
                st.state = CircuitState::Open;
                debug!("circuit breaker re-opened after failed probe");
            }
            CircuitState::Closed | CircuitState::Open => {
                st.consecutive_failures = st.consecutive_failures.saturating_add(1);
                if st.consecutive_failures >= threshold {
                    if st.state == CircuitState::Closed {
                        debug!(failures = st.consecutive_failures, "circuit breaker opened");
                    }
                    st.last_failure = Some(Instant::now());
                    st.state = CircuitState::Open;
                }
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let st = self.lock();
        let open_remaining_ms = match (st.state, st.last_failure) {
            (CircuitState::Open, Some(at)) => self
                .cfg
                .open_timeout
                .checked_sub(at.elapsed())
                .map(|d| d.as_millis() as u64),
            _ => None,
        };
        CircuitBreakerSnapshot {
            state: st.state,
            failure_threshold: self.cfg.failure_threshold,
            open_timeout_ms: self.cfg.open_timeout.as_millis() as u64,
            consecutive_failures: st.consecutive_failures,
            open_remaining_ms,
        }
    }
}
