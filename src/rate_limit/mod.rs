//! Rate limiting for migration API traffic.
//!
//! Both platforms impose strict request-rate limits that differ sharply by
//! endpoint family: bulk-read/export endpoints allow high throughput, while
//! per-recipient message posting and file upload allow only a handful of
//! calls per second. Every outbound call is gated by a token bucket owned by
//! a per-run [`RateLimiterRegistry`], keyed by [`ServiceTier`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use chat_migrate::rate_limit::{RateLimiterRegistry, ServiceTier};
//!
//! let registry = RateLimiterRegistry::new();
//!
//! // Blocks (with bounded exponential waits) until a token is available.
//! registry.acquire(ServiceTier::DestMessagePost).await?;
//!
//! let status = registry.status(ServiceTier::DestMessagePost).await;
//! println!("{}/{} tokens left", status.available, status.capacity);
//! ```

mod bucket;
mod registry;

pub use bucket::TokenBucket;
pub use registry::{RateLimiterRegistry, TierStatus};

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A throttling domain: one platform endpoint family with its own limits.
///
/// Each tier has exactly one [`TokenBucket`] in a registry for the process
/// lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceTier {
    /// Source platform bulk history/export reads
    SourceBulkRead,
    /// Source platform file content downloads
    SourceFileDownload,
    /// Destination platform space/membership administration
    DestSpaceAdmin,
    /// Destination platform message posting (per-recipient limited)
    DestMessagePost,
    /// Destination platform attachment upload
    DestFileUpload,
}

impl ServiceTier {
    /// All known tiers.
    pub const ALL: [ServiceTier; 5] = [
        ServiceTier::SourceBulkRead,
        ServiceTier::SourceFileDownload,
        ServiceTier::DestSpaceAdmin,
        ServiceTier::DestMessagePost,
        ServiceTier::DestFileUpload,
    ];

    /// The built-in default configuration for this tier.
    pub fn default_config(self) -> RateLimitConfig {
        match self {
            ServiceTier::SourceBulkRead => RateLimitConfig {
                capacity: limits::source_bulk_read::CAPACITY,
                refill_rate: limits::source_bulk_read::REFILL_RATE,
                retry: RetryPolicy::default(),
            },
            ServiceTier::SourceFileDownload => RateLimitConfig {
                capacity: limits::source_file_download::CAPACITY,
                refill_rate: limits::source_file_download::REFILL_RATE,
                retry: RetryPolicy::default(),
            },
            ServiceTier::DestSpaceAdmin => RateLimitConfig {
                capacity: limits::dest_space_admin::CAPACITY,
                refill_rate: limits::dest_space_admin::REFILL_RATE,
                retry: RetryPolicy::default(),
            },
            ServiceTier::DestMessagePost => RateLimitConfig {
                capacity: limits::dest_message_post::CAPACITY,
                refill_rate: limits::dest_message_post::REFILL_RATE,
                retry: RetryPolicy::default(),
            },
            ServiceTier::DestFileUpload => RateLimitConfig {
                capacity: limits::dest_file_upload::CAPACITY,
                refill_rate: limits::dest_file_upload::REFILL_RATE,
                retry: RetryPolicy::default(),
            },
        }
    }
}

impl std::fmt::Display for ServiceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServiceTier::SourceBulkRead => "source_bulk_read",
            ServiceTier::SourceFileDownload => "source_file_download",
            ServiceTier::DestSpaceAdmin => "dest_space_admin",
            ServiceTier::DestMessagePost => "dest_message_post",
            ServiceTier::DestFileUpload => "dest_file_upload",
        };
        f.write_str(name)
    }
}

/// Retry timing policy: bounded exponential backoff.
///
/// Used both for waiting on an empty token bucket and for the executor's
/// retry sleeps, so a tier's throttling behavior is described in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy.
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// The delay before retry number `attempt` (zero-based):
    /// `min(base_delay * 2^attempt, max_delay)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: limits::retry::MAX_RETRIES,
            base_delay: Duration::from_millis(limits::retry::BASE_DELAY_MS),
            max_delay: Duration::from_millis(limits::retry::MAX_DELAY_MS),
        }
    }
}

/// Configuration for one tier's token bucket.
///
/// Immutable once a bucket is constructed from it; changing a tier's limits
/// means replacing the bucket through
/// [`RateLimiterRegistry::configure`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum number of tokens the bucket can hold
    pub capacity: u32,
    /// Tokens added per second of elapsed wall-clock time
    pub refill_rate: f64,
    /// Waiting and retry timing for this tier
    pub retry: RetryPolicy,
}

impl RateLimitConfig {
    /// Create a config with the default retry policy.
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Built-in rate limit constants by tier.
///
/// These reflect each platform's documented limits: export-style reads are
/// generous, per-recipient posting and uploads are tight.
pub mod limits {
    /// Source bulk history/export reads.
    pub mod source_bulk_read {
        /// Maximum burst size.
        pub const CAPACITY: u32 = 100;
        /// Tokens per second (~1000 requests/minute).
        pub const REFILL_RATE: f64 = 16.67;
    }

    /// Source file content downloads.
    pub mod source_file_download {
        /// Maximum burst size.
        pub const CAPACITY: u32 = 20;
        /// Tokens per second.
        pub const REFILL_RATE: f64 = 2.0;
    }

    /// Destination space and membership administration.
    pub mod dest_space_admin {
        /// Maximum burst size.
        pub const CAPACITY: u32 = 10;
        /// Tokens per second (60 requests/minute).
        pub const REFILL_RATE: f64 = 1.0;
    }

    /// Destination message posting, limited per recipient space.
    pub mod dest_message_post {
        /// Maximum burst size.
        pub const CAPACITY: u32 = 5;
        /// Tokens per second (~50 requests/minute).
        pub const REFILL_RATE: f64 = 0.83;
    }

    /// Destination attachment uploads.
    pub mod dest_file_upload {
        /// Maximum burst size.
        pub const CAPACITY: u32 = 3;
        /// Tokens per second.
        pub const REFILL_RATE: f64 = 0.8;
    }

    /// Default retry timing shared by all tiers.
    pub mod retry {
        /// Retries after the initial attempt.
        pub const MAX_RETRIES: u32 = 5;
        /// First retry delay in milliseconds.
        pub const BASE_DELAY_MS: u64 = 500;
        /// Delay ceiling in milliseconds.
        pub const MAX_DELAY_MS: u64 = 30_000;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(450));

        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(450));
        assert_eq!(policy.delay_for(30), Duration::from_millis(450));
    }

    #[test]
    fn test_tier_defaults_differ_by_family() {
        let read = ServiceTier::SourceBulkRead.default_config();
        let post = ServiceTier::DestMessagePost.default_config();

        assert!(read.capacity > post.capacity);
        assert!(read.refill_rate > post.refill_rate);
        assert!((3..=20).contains(&post.capacity));
        assert!((0.8..=1.67).contains(&post.refill_rate));
    }

    #[test]
    fn test_tier_serde_round_trip() {
        let json = serde_json::to_string(&ServiceTier::DestFileUpload).unwrap();
        assert_eq!(json, "\"dest_file_upload\"");
        let tier: ServiceTier = serde_json::from_str(&json).unwrap();
        assert_eq!(tier, ServiceTier::DestFileUpload);
    }
}
