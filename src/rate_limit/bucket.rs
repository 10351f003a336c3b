//! Token bucket with lazy time-based refill.
//!
//! Tokens accrue continuously in proportion to elapsed wall-clock time,
//! capped at the bucket's capacity. There is no background refill task: the
//! bucket settles up whenever it is touched. The refill-then-decrement
//! sequence runs inside a single critical section, so concurrent workers
//! never observe a partial refill or double-spend a token.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::MigrateError;
use crate::rate_limit::{RateLimitConfig, ServiceTier};

/// A token bucket for one [`ServiceTier`].
///
/// A fresh bucket starts full. [`acquire`](TokenBucket::acquire) takes one
/// token, suspending with bounded exponential waits while the bucket is
/// empty; [`available_tokens`](TokenBucket::available_tokens) projects the
/// current level without spending anything.
#[derive(Debug)]
pub struct TokenBucket {
    tier: ServiceTier,
    config: RateLimitConfig,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    /// Current token count; `0 <= tokens <= capacity` at all times
    tokens: f64,
    /// When the count was last settled against the clock
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket for a tier.
    pub fn new(tier: ServiceTier, config: RateLimitConfig) -> Self {
        Self {
            tier,
            config,
            state: Mutex::new(BucketState {
                tokens: config.capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// The tier this bucket throttles.
    pub fn tier(&self) -> ServiceTier {
        self.tier
    }

    /// The immutable configuration this bucket was built from.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Acquire one token, waiting if the bucket is empty.
    ///
    /// Each wait sleeps `min(base_delay * 2^attempt, max_delay)` before the
    /// whole refill-and-check sequence runs again. After `max_retries`
    /// unsuccessful waits this fails with
    /// [`MigrateError::RateLimitExhausted`].
    pub async fn acquire(&self) -> Result<(), MigrateError> {
        let mut attempt: u32 = 0;
        loop {
            match self.try_acquire().await {
                Ok(()) => return Ok(()),
                Err(shortfall) => {
                    if attempt >= self.config.retry.max_retries {
                        tracing::warn!(
                            tier = %self.tier,
                            waits = attempt,
                            "token bucket exhausted"
                        );
                        return Err(MigrateError::RateLimitExhausted {
                            tier: self.tier,
                            attempts: attempt,
                        });
                    }
                    let delay = self.config.retry.delay_for(attempt);
                    tracing::debug!(
                        tier = %self.tier,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        shortfall_ms = shortfall.as_millis() as u64,
                        "waiting for rate limit token"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Try to take one token without waiting.
    ///
    /// Returns `Err` with the time until a token would accrue at the current
    /// refill rate.
    pub async fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.state.lock().await;
        refill(&mut state, &self.config);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else if self.config.refill_rate > 0.0 {
            let shortfall = (1.0 - state.tokens) / self.config.refill_rate;
            Err(Duration::from_secs_f64(shortfall))
        } else {
            Err(Duration::MAX)
        }
    }

    /// Current token count after settling against the clock, without
    /// spending anything.
    pub async fn available_tokens(&self) -> f64 {
        let state = self.state.lock().await;
        let accrued = state.last_refill.elapsed().as_secs_f64() * self.config.refill_rate;
        (state.tokens + accrued).min(self.config.capacity as f64)
    }
}

/// Settle the token count against elapsed time. Must hold the state lock.
fn refill(state: &mut BucketState, config: &RateLimitConfig) {
    let now = Instant::now();
    let elapsed = now.duration_since(state.last_refill);
    if elapsed > Duration::ZERO {
        let accrued = elapsed.as_secs_f64() * config.refill_rate;
        state.tokens = (state.tokens + accrued).min(config.capacity as f64);
        state.last_refill = now;
    }
}
