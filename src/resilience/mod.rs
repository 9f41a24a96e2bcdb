// src/resilience/mod.rs
//
// Retry, circuit breaking and rate limiting for outbound calls. Breakers and
// limiters are keyed by upstream host name and shared by reference: every
// task hitting the same host sees the same window and the same bucket.

pub mod breaker;
pub mod limiter;

use crate::utils::clock::Clock;
use crate::utils::error::ClientError;
use breaker::{BreakerConfig, CircuitBreaker};
use limiter::{LimiterConfig, TokenBucket};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Bounded retry with fixed backoff. Only transient-network and 5xx failures
/// are retried; see [`ClientError::is_retryable`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// The resilience state for one upstream host: retry policy plus shared
/// breaker and (optionally) rate limiter handles.
pub struct Upstream {
    name: String,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
    limiter: Option<Arc<TokenBucket>>,
}

impl Upstream {
    /// Runs `op` under the retry/breaker/limiter policy. The limiter and
    /// breaker are consulted before every attempt, so an empty bucket or an
    /// open breaker fails fast without a network call.
    ///
    /// The limiter goes first: acquiring the breaker consumes the one
    /// half-open trial slot, and that slot must not be spent on a call the
    /// limiter then rejects, or the trial outcome would never be recorded
    /// and the breaker could not close again.
    pub async fn call<T, F, Fut>(&self, mut op: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if let Some(limiter) = &self.limiter {
                limiter.acquire().await?;
            }
            self.breaker.try_acquire()?;

            match op().await {
                Ok(value) => {
                    self.breaker.record_success();
                    return Ok(value);
                }
                Err(e) => {
                    if e.is_breaker_worthy() {
                        self.breaker.record_failure();
                    } else {
                        // the upstream answered, just not in our favor; a
                        // half-open trial must still settle or the breaker
                        // could never close again
                        self.breaker.record_ignored();
                    }
                    if !e.is_retryable() || attempt >= self.retry.max_attempts {
                        return Err(e);
                    }
                    tracing::warn!(
                        "call to {} failed (attempt {}/{}), retrying in {:?}: {}",
                        self.name,
                        attempt,
                        self.retry.max_attempts,
                        self.retry.backoff,
                        e
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                }
            }
        }
    }
}

/// Lazily builds and hands out per-host [`Upstream`] handles. One registry
/// per client instance; the handles it returns share breaker/limiter state
/// for the same host name.
pub struct UpstreamRegistry {
    retry: RetryPolicy,
    breaker_config: BreakerConfig,
    limiter_config: Option<LimiterConfig>,
    clock: Arc<dyn Clock>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    limiters: Mutex<HashMap<String, Arc<TokenBucket>>>,
}

impl UpstreamRegistry {
    pub fn new(
        retry: RetryPolicy,
        breaker_config: BreakerConfig,
        limiter_config: Option<LimiterConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            retry,
            breaker_config,
            limiter_config,
            clock,
            breakers: Mutex::new(HashMap::new()),
            limiters: Mutex::new(HashMap::new()),
        }
    }

    pub fn upstream(&self, name: &str) -> Upstream {
        let breaker = {
            let mut breakers = self.breakers.lock().unwrap();
            breakers
                .entry(name.to_string())
                .or_insert_with(|| {
                    Arc::new(CircuitBreaker::new(
                        name,
                        self.breaker_config.clone(),
                        self.clock.clone(),
                    ))
                })
                .clone()
        };
        let limiter = self.limiter_config.as_ref().map(|config| {
            let mut limiters = self.limiters.lock().unwrap();
            limiters
                .entry(name.to_string())
                .or_insert_with(|| {
                    Arc::new(TokenBucket::new(name, config.clone(), self.clock.clone()))
                })
                .clone()
        });
        Upstream {
            name: name.to_string(),
            retry: self.retry.clone(),
            breaker,
            limiter,
        }
    }
}
