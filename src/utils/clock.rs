// src/utils/clock.rs
use chrono::{DateTime, Utc};

/// Injectable time source. Production code uses [`SystemClock`]; tests supply
/// fixed or manually-advanced timestamps so breaker cool-downs and record
/// timestamps are deterministic.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
