//! Error classification for retry decisions.
//!
//! Both platforms report throttling and failure in different shapes: one uses
//! HTTP 429 with a `Retry-After` hint, one uses a `"rate_limited"` error code
//! string, and quota exhaustion sometimes only shows up as a message
//! substring. Rather than scattering shape-sniffing through call sites, the
//! classifier is an ordered list of named predicate rules evaluated
//! first-match-wins, composed behind the [`ErrorClassifier`] capability that
//! the backoff executor consumes.
//!
//! # Example
//!
//! ```rust
//! use chat_migrate::classify::{ErrorClassifier, ErrorKind, Rule, RuleClassifier};
//! use chat_migrate::error::{ApiError, MigrateError};
//!
//! let classifier = RuleClassifier::standard();
//! let error = MigrateError::Api(ApiError::http(429, "Too Many Requests"));
//! assert_eq!(classifier.classify(&error).kind, ErrorKind::RateLimited);
//!
//! // Extend for a platform quirk without touching the executor.
//! let classifier = classifier.with_rule_front(Rule::new(
//!     "maintenance-window",
//!     ErrorKind::Transient,
//!     |e| e.to_string().contains("scheduled maintenance"),
//! ));
//! ```

use std::time::Duration;

use crate::error::MigrateError;

/// Failure category driving the executor's retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Explicit throttling signal; retried with backoff
    RateLimited,
    /// Server-side or transport hiccup; retried with backoff
    Transient,
    /// Caller-attributable failure (auth, not-found, bad request); never retried
    Permanent,
    /// Unrecognized shape; treated as non-retryable so bugs surface instead
    /// of masquerading as transient failures
    Unknown,
}

/// The outcome of classifying one error. Never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedError {
    /// The failure category
    pub kind: ErrorKind,
    /// Platform-supplied retry hint, when the error carried one
    pub retry_after: Option<Duration>,
}

impl ClassifiedError {
    /// Whether the executor may retry this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::RateLimited | ErrorKind::Transient)
    }
}

/// Capability consumed by the backoff executor.
///
/// Implementations are per external platform; the executor never branches on
/// concrete error shapes itself.
pub trait ErrorClassifier: Send + Sync {
    /// Normalize a failure into the retry taxonomy.
    fn classify(&self, error: &MigrateError) -> ClassifiedError;
}

/// One named predicate rule.
pub struct Rule {
    name: &'static str,
    kind: ErrorKind,
    predicate: Box<dyn Fn(&MigrateError) -> bool + Send + Sync>,
}

impl Rule {
    /// Create a rule mapping errors matched by `predicate` to `kind`.
    pub fn new(
        name: &'static str,
        kind: ErrorKind,
        predicate: impl Fn(&MigrateError) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            kind,
            predicate: Box::new(predicate),
        }
    }

    /// The rule's name, used in trace output.
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn matches(&self, error: &MigrateError) -> bool {
        (self.predicate)(error)
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// An ordered list of rules evaluated first-match-wins, falling through to
/// [`ErrorKind::Unknown`].
#[derive(Debug)]
pub struct RuleClassifier {
    rules: Vec<Rule>,
}

impl RuleClassifier {
    /// Create an empty classifier (everything classifies as `Unknown`).
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Create a classifier with the cross-platform standard rules.
    ///
    /// Priority order follows how unambiguous each signal is: explicit
    /// rate-limit shapes first, then server/transport trouble, then
    /// caller-attributable failures.
    pub fn standard() -> Self {
        Self::empty()
            .with_rule(Rule::new("http-429", ErrorKind::RateLimited, |e| {
                matches!(e, MigrateError::Api(api) if api.status == Some(429))
            }))
            .with_rule(Rule::new("rate-limited-code", ErrorKind::RateLimited, |e| {
                matches!(e, MigrateError::Api(api) if api.is_rate_limit())
            }))
            .with_rule(Rule::new("quota-exceeded", ErrorKind::RateLimited, |e| {
                matches!(e, MigrateError::Api(api) if api.is_quota_exceeded())
            }))
            .with_rule(Rule::new("http-5xx", ErrorKind::Transient, |e| {
                matches!(e, MigrateError::Api(api) if api.is_server_error())
            }))
            .with_rule(Rule::new("transport", ErrorKind::Transient, |e| {
                matches!(e, MigrateError::Transport(_) | MigrateError::Timeout)
            }))
            .with_rule(Rule::new("auth", ErrorKind::Permanent, |e| {
                matches!(e, MigrateError::Auth(_))
                    || matches!(e, MigrateError::Api(api) if api.is_auth())
            }))
            .with_rule(Rule::new("http-4xx", ErrorKind::Permanent, |e| {
                matches!(e, MigrateError::Api(api) if api.is_client_error())
            }))
    }

    /// Append a rule after the existing ones.
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Insert a rule ahead of the existing ones.
    ///
    /// Platform-specific quirks that would otherwise be shadowed by a
    /// standard rule go here.
    pub fn with_rule_front(mut self, rule: Rule) -> Self {
        self.rules.insert(0, rule);
        self
    }

    /// The installed rules, in evaluation order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

impl ErrorClassifier for RuleClassifier {
    fn classify(&self, error: &MigrateError) -> ClassifiedError {
        for rule in &self.rules {
            if rule.matches(error) {
                tracing::trace!(rule = rule.name, kind = ?rule.kind, "classified error");
                return ClassifiedError {
                    kind: rule.kind,
                    retry_after: retry_hint(error),
                };
            }
        }
        ClassifiedError {
            kind: ErrorKind::Unknown,
            retry_after: None,
        }
    }
}

/// Pull an explicit retry hint out of an error, if the platform supplied one.
fn retry_hint(error: &MigrateError) -> Option<Duration> {
    match error {
        MigrateError::Api(api) => api.retry_after,
        _ => None,
    }
}
