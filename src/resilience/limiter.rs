// src/resilience/limiter.rs
use crate::utils::clock::Clock;
use crate::utils::error::ClientError;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

/// Token-bucket settings, applied per upstream host.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Maximum number of stored tokens.
    pub capacity: f64,
    /// Tokens added per second.
    pub refill_per_sec: f64,
    /// How long a caller is willing to wait for a token before failing with
    /// `RateLimited`. Zero means fail immediately when the bucket is empty.
    pub wait_budget: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 2.0,
            refill_per_sec: 1.0,
            wait_budget: Duration::from_secs(2),
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill_ms: i64,
}

/// One bucket per upstream host, shared by reference across tasks.
pub struct TokenBucket {
    name: String,
    config: LimiterConfig,
    clock: Arc<dyn Clock>,
    bucket: Mutex<Bucket>,
}

impl TokenBucket {
    pub fn new(name: &str, config: LimiterConfig, clock: Arc<dyn Clock>) -> Self {
        let now_ms = clock.now_utc().timestamp_millis();
        let initial_tokens = config.capacity.max(0.0);
        Self {
            name: name.to_string(),
            config,
            clock,
            bucket: Mutex::new(Bucket {
                tokens: initial_tokens,
                last_refill_ms: now_ms,
            }),
        }
    }

    /// Takes one token, sleeping up to the wait budget for a refill. When no
    /// token can be had in time the call fails fast with
    /// [`ClientError::RateLimited`] and no network request is made.
    pub async fn acquire(&self) -> Result<(), ClientError> {
        let wait = match self.try_take() {
            None => return Ok(()),
            Some(wait) => wait,
        };
        if wait > self.config.wait_budget {
            tracing::warn!(
                "rate limiter {} exhausted (next token in {:?}, budget {:?})",
                self.name,
                wait,
                self.config.wait_budget
            );
            return Err(ClientError::RateLimited {
                upstream: self.name.clone(),
            });
        }
        tokio::time::sleep(wait).await;
        match self.try_take() {
            None => Ok(()),
            // Another task raced us to the refilled token.
            Some(_) => Err(ClientError::RateLimited {
                upstream: self.name.clone(),
            }),
        }
    }

    /// Returns `None` on success, or the time until the next token.
    fn try_take(&self) -> Option<Duration> {
        let mut bucket = self.bucket.lock().unwrap();
        let now_ms = self.clock.now_utc().timestamp_millis();
        let elapsed_secs = (now_ms - bucket.last_refill_ms).max(0) as f64 / 1000.0;
        bucket.tokens =
            (bucket.tokens + elapsed_secs * self.config.refill_per_sec).min(self.config.capacity);
        bucket.last_refill_ms = now_ms;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - bucket.tokens;
            Some(Duration::from_secs_f64(deficit / self.config.refill_per_sec))
        }
    }
}
