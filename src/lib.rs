//! # chat-migrate
//!
//! Rate-limited execution coordinator for bulk migrations of conversational
//! data (channels, messages, threads, reactions, attachments) between two
//! externally-hosted chat platforms.
//!
//! ## Features
//!
//! - Per-tier token buckets with lazy time-based refill
//! - A per-run registry with built-in limits reflecting each platform's
//!   documented throttling tiers
//! - A single retry boundary with pluggable error classification and
//!   bounded exponential backoff
//! - Ordering for the two protocols migration correctness depends on:
//!   thread-root resolution and multi-phase attachment upload
//! - A concurrency governor bounding how many channels migrate in parallel
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chat_migrate::classify::RuleClassifier;
//! use chat_migrate::config::CommandProfile;
//! use chat_migrate::executor::BackoffExecutor;
//! use chat_migrate::rate_limit::{RateLimiterRegistry, ServiceTier};
//! use chat_migrate::sequencer::Sequencer;
//!
//! # async fn run() -> chat_migrate::Result<()> {
//! let registry = Arc::new(RateLimiterRegistry::new());
//! let profile = CommandProfile::bulk_write();
//! profile.apply(&registry).await;
//!
//! let executor = BackoffExecutor::new(registry, Arc::new(RuleClassifier::standard()));
//! let governor = profile.governor();
//! let sequencer = Sequencer::new(executor.clone());
//!
//! governor
//!     .with_slot(|| async {
//!         executor
//!             .run(ServiceTier::DestMessagePost, || async {
//!                 // one platform API call
//!                 Ok(())
//!             })
//!             .await
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! The OAuth flows, CLI, JSON shape conversion and the platform clients
//! themselves live in the migration driver; this crate only sees opaque
//! units of work tagged with a [`rate_limit::ServiceTier`].

pub mod classify;
pub mod config;
pub mod error;
pub mod executor;
pub mod governor;
pub mod rate_limit;
pub mod sequencer;

// Re-export commonly used types at crate root
pub use classify::{ClassifiedError, ErrorClassifier, ErrorKind, RuleClassifier};
pub use error::{ApiError, MigrateError};
pub use executor::BackoffExecutor;
pub use governor::ConcurrencyGovernor;
pub use rate_limit::{RateLimitConfig, RateLimiterRegistry, RetryPolicy, ServiceTier};
pub use sequencer::Sequencer;

/// Result type alias using MigrateError
pub type Result<T> = std::result::Result<T, MigrateError>;
