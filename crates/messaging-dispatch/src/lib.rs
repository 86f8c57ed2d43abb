//! Dispatch engine for outbound messages.
//!
//! Pairs a periodic tick scheduler with a batch dispatcher: each tick claims
//! a bounded batch of pending rows from the store, validates and posts each
//! one to the configured webhook, and records per-message outcomes. Delivery
//! is at-most-once per row; failures are recorded, never retried.
//!
//! ```text
//!  Scheduler ──tick──▶ MessageStore::claim_pending (SKIP LOCKED)
//!                          │
//!                          ▼
//!                      Dispatcher ──▶ WebhookClient ──▶ remote endpoint
//!                          │
//!               ┌──────────┴───────────┐
//!               ▼                      ▼
//!        Outcomes::record_sent  Outcomes::record_failed
//!        (mark_sent + cache)    (mark_failed)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod client;
pub mod dispatcher;
pub mod error;
pub mod scheduler;

pub use cache::{NoopSentCache, RedisCacheConfig, RedisSentCache, SentCache};
pub use client::{WebhookClient, WebhookConfig};
pub use dispatcher::{BatchStats, Dispatcher, Outcomes, StoreOutcomes};
pub use error::{CacheError, SchedulerError, WebhookError};
pub use scheduler::{Scheduler, TickFn, TickFuture};

/// Default per-request deadline for webhook calls.
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// Default time-to-live for cached sent entries.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 86_400;
