//! Backoff executor: the crate's single retry boundary.
//!
//! Every outbound platform call is submitted here as an opaque unit of work
//! tagged with its [`ServiceTier`]. The executor gates each attempt on the
//! tier's token bucket, classifies failures through the injected
//! [`ErrorClassifier`], and retries rate-limited and transient failures with
//! bounded exponential backoff. Nothing above it re-implements retry logic,
//! and it knows nothing about messages, channels, or attachments.

use std::sync::Arc;

use crate::classify::ErrorClassifier;
use crate::error::MigrateError;
use crate::rate_limit::{RateLimiterRegistry, ServiceTier};

/// Wraps units of work with acquire → execute → classify → retry.
#[derive(Clone)]
pub struct BackoffExecutor {
    registry: Arc<RateLimiterRegistry>,
    classifier: Arc<dyn ErrorClassifier>,
}

impl BackoffExecutor {
    /// Create an executor over a per-run registry and a platform classifier.
    pub fn new(registry: Arc<RateLimiterRegistry>, classifier: Arc<dyn ErrorClassifier>) -> Self {
        Self {
            registry,
            classifier,
        }
    }

    /// The registry this executor acquires tokens from.
    pub fn registry(&self) -> &Arc<RateLimiterRegistry> {
        &self.registry
    }

    /// Run one unit of work under `tier`.
    ///
    /// Attempts the work up to `max_retries + 1` times (per the tier's retry
    /// policy). Each attempt first acquires a token, which may itself
    /// suspend. Rate-limited failures honor an explicit `retry_after` hint
    /// when the platform supplied one, capped at the tier's `max_delay`;
    /// otherwise the backoff schedule applies. Permanent and unknown
    /// failures, and retryable failures once attempts are spent, come back
    /// as [`MigrateError::WorkFailed`] carrying the tier, the attempt count,
    /// and the original error.
    pub async fn run<T, F, Fut>(&self, tier: ServiceTier, mut work: F) -> Result<T, MigrateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, MigrateError>>,
    {
        let policy = self.registry.retry_policy(tier).await;
        let mut attempt: u32 = 0;

        loop {
            self.registry.acquire(tier).await?;

            match work().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let classified = self.classifier.classify(&error);
                    let attempts = attempt + 1;

                    if classified.is_retryable() && attempt < policy.max_retries {
                        let delay = classified
                            .retry_after
                            .unwrap_or_else(|| policy.delay_for(attempt))
                            .min(policy.max_delay);
                        tracing::warn!(
                            %tier,
                            attempt = attempts,
                            kind = ?classified.kind,
                            delay_ms = delay.as_millis() as u64,
                            %error,
                            "retrying work item"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    } else {
                        tracing::debug!(
                            %tier,
                            attempts,
                            kind = ?classified.kind,
                            "work item failed terminally"
                        );
                        return Err(MigrateError::WorkFailed {
                            tier,
                            attempts,
                            source: Box::new(error),
                        });
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for BackoffExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackoffExecutor")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
