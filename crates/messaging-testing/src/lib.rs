//! Test support for the messaging workspace.
//!
//! Provides deterministic substitutes for the production collaborators:
//! a manually-advanced clock, an in-memory message store with the same
//! claim/mark semantics as the SQL implementation, a store wrapper that
//! fails every operation, and a cache double that records writes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod store;
pub mod time;

pub use cache::{CachedSend, RecordingCache};
pub use store::{FailingStore, MemoryStore};
pub use time::TestClock;
