//! Error types for the migration coordinator.

use std::time::Duration;

use thiserror::Error;

use crate::rate_limit::ServiceTier;

/// The main error type for all coordinator operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// A platform API returned a structured error response
    #[error("API error: {0}")]
    Api(ApiError),

    /// Network transport failed before a response was received
    #[error("transport error: {0}")]
    Transport(String),

    /// Request timed out
    #[error("request timed out")]
    Timeout,

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Authentication or credential failure.
    ///
    /// Drivers are expected to abort the whole run on this variant rather
    /// than continue to the next work item.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Waiting for a rate-limit token was retried to exhaustion
    #[error("rate limit exhausted for tier {tier} after {attempts} waits")]
    RateLimitExhausted {
        /// Throttling domain whose bucket ran dry
        tier: ServiceTier,
        /// Number of unsuccessful waits before giving up
        attempts: u32,
    },

    /// A unit of work failed terminally after the executor's retry loop.
    ///
    /// This is the executor's only propagation path: the original error,
    /// augmented with the tier it ran under and how many attempts were made.
    #[error("work failed on tier {tier} after {attempts} attempt(s): {source}")]
    WorkFailed {
        /// Throttling domain the work ran under
        tier: ServiceTier,
        /// Total attempts made, including the first
        attempts: u32,
        /// The original failure from the last attempt
        #[source]
        source: Box<MigrateError>,
    },

    /// Concurrency slot acquisition failed
    #[error("concurrency governor error: {0}")]
    Concurrency(String),
}

impl MigrateError {
    /// Check whether this error is an authentication failure anywhere in its
    /// chain, so drivers can abort the run instead of moving on.
    pub fn is_auth(&self) -> bool {
        match self {
            MigrateError::Auth(_) => true,
            MigrateError::Api(api) => api.is_auth(),
            MigrateError::WorkFailed { source, .. } => source.is_auth(),
            _ => false,
        }
    }

    /// The innermost error, unwrapping executor augmentation.
    pub fn root_cause(&self) -> &MigrateError {
        match self {
            MigrateError::WorkFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// A structured error returned by either platform's API.
///
/// The two platforms report failures differently (HTTP status, an error code
/// string, or only a message substring), so all three carriers are optional.
/// The classifier's rules sniff whichever fields are present.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    /// HTTP status code, if the failure reached the HTTP layer
    pub status: Option<u16>,
    /// Platform-specific error code (e.g. `"rate_limited"`)
    pub code: Option<String>,
    /// Human-readable error message
    pub message: String,
    /// Explicit retry hint supplied by the platform, if any
    pub retry_after: Option<Duration>,
    /// Raw error payload for diagnostics
    pub details: Option<serde_json::Value>,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.status, self.code.as_deref()) {
            (Some(status), Some(code)) => write!(f, "{status} {code}: {}", self.message),
            (Some(status), None) => write!(f, "{status}: {}", self.message),
            (None, Some(code)) => write!(f, "{code}: {}", self.message),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

impl ApiError {
    /// Create a new API error with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
            retry_after: None,
            details: None,
        }
    }

    /// Create a new API error from an HTTP status and message.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(message)
        }
    }

    /// Attach a platform-specific error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach an explicit retry-after hint.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Attach the raw error payload.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Check if this is an explicit rate-limit error (HTTP 429 or a
    /// rate-limit error code).
    pub fn is_rate_limit(&self) -> bool {
        self.status == Some(429)
            || self.code.as_deref().is_some_and(|c| {
                c.eq_ignore_ascii_case("rate_limited") || c.eq_ignore_ascii_case("ratelimited")
            })
    }

    /// Check if this is a quota-exhaustion error reported only in the
    /// message body.
    pub fn is_quota_exceeded(&self) -> bool {
        let message = self.message.to_ascii_lowercase();
        message.contains("quota exceeded") || message.contains("resource_exhausted")
    }

    /// Check if this is an authentication or permission error.
    pub fn is_auth(&self) -> bool {
        matches!(self.status, Some(401) | Some(403))
            || self
                .code
                .as_deref()
                .is_some_and(|c| c == "invalid_auth" || c == "token_expired" || c == "not_authed")
    }

    /// Check if this is a server-side error.
    pub fn is_server_error(&self) -> bool {
        self.status.is_some_and(|s| (500..600).contains(&s))
    }

    /// Check if this is a client-side error other than rate limiting.
    pub fn is_client_error(&self) -> bool {
        self.status.is_some_and(|s| (400..500).contains(&s) && s != 429)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let error = ApiError::http(404, "channel not found").with_code("channel_not_found");
        assert_eq!(error.to_string(), "404 channel_not_found: channel not found");
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(ApiError::http(429, "Too Many Requests").is_rate_limit());
        assert!(ApiError::new("slow down").with_code("rate_limited").is_rate_limit());
        assert!(!ApiError::http(500, "oops").is_rate_limit());
    }

    #[test]
    fn test_quota_detection() {
        assert!(ApiError::new("Quota exceeded for quota metric 'Write requests'").is_quota_exceeded());
        assert!(ApiError::new("RESOURCE_EXHAUSTED").is_quota_exceeded());
    }

    #[test]
    fn test_auth_detection_through_chain() {
        let inner = MigrateError::Api(ApiError::http(401, "invalid token"));
        let wrapped = MigrateError::WorkFailed {
            tier: ServiceTier::DestMessagePost,
            attempts: 1,
            source: Box::new(inner),
        };
        assert!(wrapped.is_auth());
    }

    #[test]
    fn test_root_cause_unwraps_augmentation() {
        let wrapped = MigrateError::WorkFailed {
            tier: ServiceTier::SourceBulkRead,
            attempts: 3,
            source: Box::new(MigrateError::Timeout),
        };
        assert!(matches!(wrapped.root_cause(), MigrateError::Timeout));
    }
}
