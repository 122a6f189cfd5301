use std::fmt;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
pub enum BreakerError<E> {
    /// Failed fast without calling the dependency.
    Open(&'static str),
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::Open(name) => write!(f, "circuit open for {}", name),
            BreakerError::Inner(err) => err.fmt(f),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for BreakerError<E> {}

enum State {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { successes: u32 },
}

/// Three-state guard around an unreliable outbound dependency.
///
/// Closed counts consecutive failures; at the threshold it opens and fails
/// fast. After the recovery timeout the next call probes in HalfOpen;
/// enough consecutive successes close it again, any failure re-opens.
/// The breaker only looks at "returned an error or not" and never
/// interprets error categories.
pub struct CircuitBreaker {
    name: &'static str,
    failure_threshold: u32,
    success_threshold: u32,
    recovery_timeout: Duration,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(
        name: &'static str,
        failure_threshold: u32,
        success_threshold: u32,
        recovery_timeout: Duration,
    ) -> Self {
        Self {
            name,
            failure_threshold,
            success_threshold,
            recovery_timeout,
            state: Mutex::new(State::Closed { failures: 0 }),
        }
    }

    pub fn state(&self) -> BreakerState {
        match *self.state.lock() {
            State::Closed { .. } => BreakerState::Closed,
            State::Open { .. } => BreakerState::Open,
            State::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }

    /// Check admission, transitioning Open -> HalfOpen lazily.
    fn admit(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            State::Closed { .. } | State::HalfOpen { .. } => true,
            State::Open { opened_at } => {
                if opened_at.elapsed() >= self.recovery_timeout {
                    tracing::info!(breaker = self.name, "Circuit half-open, probing");
                    *state = State::HalfOpen { successes: 0 };
                    true
                } else {
                    false
                }
            }
        }
    }

    fn on_success(&self) {
        let mut state = self.state.lock();
        match *state {
            State::Closed { .. } => {
                *state = State::Closed { failures: 0 };
            }
            State::HalfOpen { successes } => {
                let successes = successes + 1;
                if successes >= self.success_threshold {
                    tracing::info!(breaker = self.name, "Circuit closed after recovery");
                    *state = State::Closed { failures: 0 };
                } else {
                    *state = State::HalfOpen { successes };
                }
            }
            State::Open { .. } => {}
        }
    }

    fn on_failure(&self) {
        let mut state = self.state.lock();
        match *state {
            State::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.failure_threshold {
                    tracing::warn!(
                        breaker = self.name,
                        failures,
                        "Circuit opened after consecutive failures"
                    );
                    *state = State::Open {
                        opened_at: Instant::now(),
                    };
                } else {
                    *state = State::Closed { failures };
                }
            }
            State::HalfOpen { .. } => {
                tracing::warn!(breaker = self.name, "Probe failed, circuit re-opened");
                *state = State::Open {
                    opened_at: Instant::now(),
                };
            }
            State::Open { .. } => {}
        }
    }

    /// Run `call` under the breaker. A future dropped before completion is
    /// neither a success nor a failure.
    pub async fn call<T, E, F, Fut>(&self, call: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.admit() {
            return Err(BreakerError::Open(self.name));
        }

        match call().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(BreakerError::Inner(err))
            }
        }
    }
}
