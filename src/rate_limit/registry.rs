//! Per-run registry of tier token buckets.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::MigrateError;
use crate::rate_limit::{RateLimitConfig, RetryPolicy, ServiceTier, TokenBucket};

/// Owns one [`TokenBucket`] per [`ServiceTier`].
///
/// Buckets are constructed lazily on first touch from the tier's built-in
/// defaults; [`configure`](RateLimiterRegistry::configure) replaces a tier's
/// bucket outright. Construct one registry per migration run and pass it by
/// reference into the executor — there is deliberately no process-global
/// instance, so tests can run isolated registries in parallel.
///
/// The tier map is read-mostly after warm-up; first-touch initialization
/// happens under the write lock so a racing first touch never creates two
/// buckets for the same tier.
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    buckets: RwLock<HashMap<ServiceTier, Arc<TokenBucket>>>,
}

/// A point-in-time view of one tier's bucket, for observability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierStatus {
    /// Tokens currently available
    pub available: f64,
    /// The bucket's maximum token count
    pub capacity: u32,
}

impl RateLimiterRegistry {
    /// Create an empty registry; buckets appear on first touch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire one token for `tier`, waiting per the tier's retry policy.
    pub async fn acquire(&self, tier: ServiceTier) -> Result<(), MigrateError> {
        self.bucket(tier).await.acquire().await
    }

    /// Replace the bucket for `tier` with one built from `config`.
    ///
    /// This is a wholesale replacement, not a merge: merging partial
    /// overrides with defaults happens one layer up, in
    /// [`crate::config::TierOverrides`], before this is called. Any tokens
    /// already spent from the old bucket are forgotten.
    pub async fn configure(&self, tier: ServiceTier, config: RateLimitConfig) {
        let mut buckets = self.buckets.write().await;
        tracing::debug!(%tier, ?config, "configuring rate limit tier");
        buckets.insert(tier, Arc::new(TokenBucket::new(tier, config)));
    }

    /// Current availability and capacity for `tier`.
    pub async fn status(&self, tier: ServiceTier) -> TierStatus {
        let bucket = self.bucket(tier).await;
        TierStatus {
            available: bucket.available_tokens().await,
            capacity: bucket.config().capacity,
        }
    }

    /// The retry policy governing `tier`, for the executor's backoff sleeps.
    pub async fn retry_policy(&self, tier: ServiceTier) -> RetryPolicy {
        self.bucket(tier).await.config().retry
    }

    /// Get the bucket for `tier`, constructing it from defaults on first
    /// touch.
    pub async fn bucket(&self, tier: ServiceTier) -> Arc<TokenBucket> {
        {
            let buckets = self.buckets.read().await;
            if let Some(bucket) = buckets.get(&tier) {
                return Arc::clone(bucket);
            }
        }

        let mut buckets = self.buckets.write().await;
        // A racing first touch may have won the write lock already.
        Arc::clone(buckets.entry(tier).or_insert_with(|| {
            tracing::debug!(%tier, "lazily constructing default bucket");
            Arc::new(TokenBucket::new(tier, tier.default_config()))
        }))
    }
}
