// src/resilience/breaker.rs
use crate::utils::clock::Clock;
use crate::utils::error::ClientError;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Sliding-window circuit breaker settings.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Number of recent call outcomes kept in the window.
    pub window_size: usize,
    /// Failure ratio (0.0..=1.0) over a full window that opens the breaker.
    pub failure_ratio: f64,
    /// How long the breaker stays open before permitting a half-open trial.
    pub cool_down: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            failure_ratio: 0.5,
            cool_down: Duration::seconds(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open { since_ms: i64 },
    HalfOpen,
}

struct Inner {
    state: State,
    // true = breaker-worthy failure
    window: VecDeque<bool>,
}

/// One breaker per upstream host, shared by reference across tasks.
///
/// Only breaker-worthy outcomes are recorded here; the caller decides what
/// counts (see [`ClientError::is_breaker_worthy`]).
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    clock: std::sync::Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: &str, config: BreakerConfig, clock: std::sync::Arc<dyn Clock>) -> Self {
        Self {
            name: name.to_string(),
            config,
            clock,
            inner: Mutex::new(Inner {
                state: State::Closed,
                window: VecDeque::new(),
            }),
        }
    }

    /// Checks whether a call may proceed. While open, fails immediately with
    /// [`ClientError::CircuitOpen`] until the cool-down elapses, at which
    /// point exactly one half-open trial call is admitted.
    pub fn try_acquire(&self) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            State::Closed => Ok(()),
            State::HalfOpen => Err(self.open_error()),
            State::Open { since_ms } => {
                let since = DateTime::<Utc>::from_timestamp_millis(since_ms)
                    .unwrap_or_else(|| self.clock.now_utc());
                if self.clock.now_utc() - since >= self.config.cool_down {
                    tracing::info!("breaker {} half-open, permitting trial call", self.name);
                    inner.state = State::HalfOpen;
                    Ok(())
                } else {
                    Err(self.open_error())
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == State::HalfOpen {
            tracing::info!("breaker {} closing after successful trial", self.name);
            inner.window.clear();
            inner.state = State::Closed;
            return;
        }
        Self::push(&mut inner.window, self.config.window_size, false);
    }

    /// Settles an outcome that must not count toward the window (a 4xx:
    /// the upstream answered, the request was just wrong). A half-open
    /// trial still closes on it, since the upstream is demonstrably alive.
    pub fn record_ignored(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == State::HalfOpen {
            tracing::info!("breaker {} closing after answered trial", self.name);
            inner.window.clear();
            inner.state = State::Closed;
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        let now_ms = self.clock.now_utc().timestamp_millis();
        if inner.state == State::HalfOpen {
            tracing::warn!("breaker {} re-opening after failed trial", self.name);
            inner.state = State::Open { since_ms: now_ms };
            return;
        }
        Self::push(&mut inner.window, self.config.window_size, true);
        if inner.window.len() == self.config.window_size {
            let failures = inner.window.iter().filter(|f| **f).count();
            let ratio = failures as f64 / self.config.window_size as f64;
            if ratio >= self.config.failure_ratio {
                tracing::warn!(
                    "breaker {} opening: {}/{} recent calls failed",
                    self.name,
                    failures,
                    self.config.window_size
                );
                inner.window.clear();
                inner.state = State::Open { since_ms: now_ms };
            }
        }
    }

    fn push(window: &mut VecDeque<bool>, size: usize, outcome: bool) {
        if window.len() == size {
            window.pop_front();
        }
        window.push_back(outcome);
    }

    fn open_error(&self) -> ClientError {
        ClientError::CircuitOpen {
            upstream: self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::test_support::ManualClock;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn breaker(window: usize, ratio: f64, cool_down_secs: i64) -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at(Utc.with_ymd_and_hms(2023, 6, 1, 9, 0, 0).unwrap()));
        let b = CircuitBreaker::new(
            "test-host",
            BreakerConfig {
                window_size: window,
                failure_ratio: ratio,
                cool_down: Duration::seconds(cool_down_secs),
            },
            clock.clone(),
        );
        (b, clock)
    }

    #[test]
    fn opens_after_window_of_failures() {
        let (b, _clock) = breaker(2, 1.0, 60);

        b.try_acquire().unwrap();
        b.record_failure();
        // one failure in a 2-slot window is not enough
        b.try_acquire().unwrap();
        b.record_failure();
        // second failure fills the window at 100%: open
        let err = b.try_acquire().unwrap_err();
        assert!(matches!(err, ClientError::CircuitOpen { .. }));
        assert_eq!(err.upstream(), "test-host");
    }

    #[test]
    fn successes_keep_ratio_below_threshold() {
        let (b, _clock) = breaker(2, 1.0, 60);
        b.record_failure();
        b.record_success();
        // window slides: a later failure sees [success, failure] = 50%
        b.record_failure();
        b.try_acquire().unwrap();
    }

    #[test]
    fn half_open_trial_closes_on_success() {
        let (b, clock) = breaker(2, 1.0, 30);
        b.record_failure();
        b.record_failure();
        assert!(b.try_acquire().is_err());

        clock.advance(Duration::seconds(31));
        // cool-down elapsed: one trial permitted
        b.try_acquire().unwrap();
        // concurrent call during the trial is still rejected
        assert!(b.try_acquire().is_err());

        b.record_success();
        b.try_acquire().unwrap();
    }

    #[test]
    fn half_open_trial_reopens_on_failure() {
        let (b, clock) = breaker(2, 1.0, 30);
        b.record_failure();
        b.record_failure();
        clock.advance(Duration::seconds(31));
        b.try_acquire().unwrap();
        b.record_failure();

        assert!(b.try_acquire().is_err());
        // and the new open period starts from the trial failure
        clock.advance(Duration::seconds(31));
        b.try_acquire().unwrap();
    }
}
