//! Core domain models and storage for the message dispatch service.
//!
//! Provides the strongly-typed `Message` entity, the error taxonomy shared
//! across the workspace, a clock abstraction for testable timestamps, and
//! the `MessageStore` repository with its PostgreSQL implementation. All
//! other crates depend on these foundational types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{Message, MessageId, MessageStatus, NewMessage};
pub use storage::{MessageStore, PostgresMessageStore};
pub use time::{Clock, RealClock};
