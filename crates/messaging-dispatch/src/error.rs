//! Error types for the dispatch engine.
//!
//! Webhook errors double as the `last_error` text persisted against failed
//! rows, so their `Display` output carries the diagnostics an operator needs:
//! the remote status code, the (truncated) response body, or the reason the
//! request never completed.

use thiserror::Error;

/// Errors from a webhook delivery attempt.
#[derive(Debug, Clone, Error)]
pub enum WebhookError {
    /// The endpoint answered with something other than `202 Accepted`.
    #[error("unexpected status code: {status} body={body:?}")]
    UnexpectedStatus {
        /// HTTP status code returned by the endpoint.
        status: u16,
        /// Response body, truncated for diagnostics.
        body: String,
    },

    /// The success body was not valid JSON of the expected shape.
    #[error("failed to decode response json: {reason} body={body:?}")]
    InvalidBody {
        /// Parser error description.
        reason: String,
        /// Raw body, truncated for diagnostics.
        body: String,
    },

    /// The success body carried no `messageId`.
    #[error("missing messageId in response body={body:?}")]
    MissingMessageId {
        /// Raw body, truncated for diagnostics.
        body: String,
    },

    /// The per-request deadline elapsed before a response arrived.
    #[error("request deadline of {seconds}s exceeded")]
    Timeout {
        /// Configured deadline in seconds.
        seconds: u64,
    },

    /// Connection-level failure (DNS, TCP, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// The caller's cancellation fired before the response arrived.
    #[error("request cancelled by shutdown")]
    Cancelled,

    /// The HTTP client could not be built from its configuration.
    #[error("invalid client configuration: {0}")]
    Configuration(String),
}

/// Errors from the sent-message cache.
///
/// Always non-fatal to the dispatch outcome: the database is the source of
/// truth and callers log-and-continue on any of these.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Redis command or connection failure.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Cache value could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Connectivity probe did not answer within its deadline.
    #[error("cache ping timed out after {seconds}s")]
    PingTimeout {
        /// Deadline in seconds.
        seconds: u64,
    },

    /// Backend rejected or dropped the write.
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Errors constructing a scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The tick interval must be positive.
    #[error("interval must be > 0")]
    ZeroInterval,
}
