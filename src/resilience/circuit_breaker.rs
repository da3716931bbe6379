use crate::{Error, Result};
use serde::Serialize;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Breaker state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

#[derive(Debug)]
struct State {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    /// Half-open admits exactly one in-flight probe; concurrent callers
    /// fail fast instead of double-invoking the operation.
    probe_in_flight: bool,
}

/// Circuit breaker gating calls on recent failure history.
///
/// - Closed: calls pass through; consecutive failures are counted
/// - Open: calls fail immediately with [`Error::CircuitOpen`] until the
///   cooldown elapses
/// - HalfOpen: exactly one probe is admitted; its outcome closes or reopens
///   the circuit
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
                failure_count: 0,
                last_failure: None,
                probe_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `operation` under the breaker. When open and still cooling down,
    /// the operation is never invoked.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.acquire()?;
        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                if err.is_circuit_failure() {
                    self.on_failure();
                } else {
                    self.on_neutral();
                }
                Err(err)
            }
        }
    }

    fn acquire(&self) -> Result<()> {
        let mut st = self.lock();
        match st.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = st
                    .last_failure
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed > self.cfg.cooldown {
                    st.state = CircuitState::HalfOpen;
                    st.probe_in_flight = true;
                    tracing::info!("circuit breaker half-open; admitting probe");
                    Ok(())
                } else {
                    let remaining = self.cfg.cooldown.saturating_sub(elapsed);
                    Err(Error::CircuitOpen {
                        retry_in_ms: remaining.as_millis() as u64,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if st.probe_in_flight {
                    Err(Error::CircuitOpen { retry_in_ms: 0 })
                } else {
                    st.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    fn on_success(&self) {
        let mut st = self.lock();
        if st.state != CircuitState::Closed {
            tracing::info!(from = st.state.as_str(), "circuit breaker closed");
        }
        st.state = CircuitState::Closed;
        st.failure_count = 0;
        st.last_failure = None;
        st.probe_in_flight = false;
    }

    fn on_failure(&self) {
        let mut st = self.lock();
        st.failure_count = st.failure_count.saturating_add(1);
        st.last_failure = Some(Instant::now());
        st.probe_in_flight = false;
        let reopen = st.state == CircuitState::HalfOpen;
        if reopen || st.failure_count >= self.cfg.failure_threshold {
            if st.state != CircuitState::Open {
                tracing::warn!(
                    failure_count = st.failure_count,
                    reopened = reopen,
                    "circuit breaker opened"
                );
            }
            st.state = CircuitState::Open;
        }
    }

    /// Outcome that says nothing about upstream health (cancellation, local
    /// validation). Releases the half-open probe slot without counting.
    fn on_neutral(&self) {
        let mut st = self.lock();
        st.probe_in_flight = false;
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let st = self.lock();
        let open_remaining_ms = match st.state {
            CircuitState::Open => st.last_failure.map(|t| {
                self.cfg
                    .cooldown
                    .saturating_sub(t.elapsed())
                    .as_millis() as u64
            }),
            _ => None,
        };
        CircuitBreakerSnapshot {
            state: st.state,
            failure_count: st.failure_count,
            failure_threshold: self.cfg.failure_threshold,
            cooldown_ms: self.cfg.cooldown.as_millis() as u64,
            open_remaining_ms,
        }
    }
}
