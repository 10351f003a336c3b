//! Driver-facing configuration surface.
//!
//! The migration driver supplies configuration before a run as partial
//! overrides: unset fields fall back to the built-in per-tier defaults.
//! Merging happens here, one layer above the registry —
//! [`RateLimiterRegistry::configure`](crate::rate_limit::RateLimiterRegistry::configure)
//! only ever sees complete configs.
//!
//! # Example
//!
//! ```rust
//! use chat_migrate::config::{CommandProfile, TierOverrides};
//! use chat_migrate::rate_limit::ServiceTier;
//!
//! let profile = CommandProfile::bulk_write().override_tier(
//!     ServiceTier::DestMessagePost,
//!     TierOverrides {
//!         capacity: Some(10),
//!         ..Default::default()
//!     },
//! );
//! assert_eq!(profile.max_concurrent_operations, 3);
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::governor::ConcurrencyGovernor;
use crate::rate_limit::{RateLimitConfig, RateLimiterRegistry, ServiceTier};

/// Partial per-tier override; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierOverrides {
    /// Bucket capacity
    pub capacity: Option<u32>,
    /// Tokens per second
    pub refill_rate: Option<f64>,
    /// Retries after the initial attempt
    pub max_retries: Option<u32>,
    /// First retry delay, milliseconds
    pub base_delay_ms: Option<u64>,
    /// Delay ceiling, milliseconds
    pub max_delay_ms: Option<u64>,
}

impl TierOverrides {
    /// Merge these overrides over `base`, keeping `base` for unset fields.
    pub fn apply(&self, base: RateLimitConfig) -> RateLimitConfig {
        let mut config = base;
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(refill_rate) = self.refill_rate {
            config.refill_rate = refill_rate;
        }
        if let Some(max_retries) = self.max_retries {
            config.retry.max_retries = max_retries;
        }
        if let Some(base_delay_ms) = self.base_delay_ms {
            config.retry.base_delay = Duration::from_millis(base_delay_ms);
        }
        if let Some(max_delay_ms) = self.max_delay_ms {
            config.retry.max_delay = Duration::from_millis(max_delay_ms);
        }
        config
    }
}

/// Configuration for one command's run: tier overrides plus the governor's
/// slot count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandProfile {
    /// How many higher-level units (channels, spaces) run in parallel
    pub max_concurrent_operations: usize,
    /// Overrides for a subset of tiers
    #[serde(default)]
    pub tiers: HashMap<ServiceTier, TierOverrides>,
}

impl CommandProfile {
    /// Profile for bulk-read pipelines (history export, file download).
    pub fn bulk_read() -> Self {
        Self {
            max_concurrent_operations: defaults::BULK_READ_SLOTS,
            tiers: HashMap::new(),
        }
    }

    /// Profile for bulk-write pipelines (posting, uploading). Writes are
    /// the tightly-limited side, so few units run at once.
    pub fn bulk_write() -> Self {
        Self {
            max_concurrent_operations: defaults::BULK_WRITE_SLOTS,
            tiers: HashMap::new(),
        }
    }

    /// Add or replace the overrides for one tier.
    pub fn override_tier(mut self, tier: ServiceTier, overrides: TierOverrides) -> Self {
        self.tiers.insert(tier, overrides);
        self
    }

    /// Install this profile's tier overrides, merged over the built-in
    /// defaults, into `registry`.
    pub async fn apply(&self, registry: &RateLimiterRegistry) {
        for (&tier, overrides) in &self.tiers {
            registry
                .configure(tier, overrides.apply(tier.default_config()))
                .await;
        }
    }

    /// A governor sized for this profile.
    pub fn governor(&self) -> ConcurrencyGovernor {
        ConcurrencyGovernor::new(self.max_concurrent_operations)
    }
}

/// Built-in governor slot counts by command family.
pub mod defaults {
    /// Concurrent units for bulk-read pipelines.
    pub const BULK_READ_SLOTS: usize = 10;
    /// Concurrent units for bulk-write pipelines.
    pub const BULK_WRITE_SLOTS: usize = 3;
}
