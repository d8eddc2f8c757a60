//! Token bucket limiting how often pages are requested.
//!
//! The bucket starts full with `burst` tokens and refills at `rate` tokens per
//! second, never holding more than `burst`. Each request takes one token.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::{CollectError, Result};

#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    tokens: f64,
    updated: Instant,
}

impl TokenBucket {
    pub fn new(rate: f64, burst: u32) -> Result<Self> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(CollectError::Config(format!("invalid rate {rate}")));
        }
        if burst == 0 {
            return Err(CollectError::Config("burst must be at least 1".to_string()));
        }
        Ok(Self {
            rate,
            burst: f64::from(burst),
            tokens: f64::from(burst),
            updated: Instant::now(),
        })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Block until a token is available and take it.
    ///
    /// With a deadline, fails immediately (without taking a token) when the
    /// token would only become available after it.
    pub async fn wait(&mut self, deadline: Option<Instant>) -> Result<()> {
        let now = Instant::now();
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }

        let ready_at = now + Duration::from_secs_f64((1.0 - self.tokens) / self.rate);
        if deadline.is_some_and(|deadline| ready_at > deadline) {
            return Err(CollectError::DeadlineExceeded);
        }

        tokio::time::sleep_until(ready_at).await;
        self.refill(Instant::now());
        // Sleep may land a hair early relative to float math; the slot is ours either way.
        self.tokens = (self.tokens - 1.0).max(0.0);
        Ok(())
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.updated).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
        self.updated = now;
    }
}
