//! Domain models for outbound messages.
//!
//! Defines the durable `Message` entity, its lifecycle status enum, and the
//! strongly-typed id wrapper. Status transitions are strictly controlled:
//!
//! ```text
//! pending ──claim──▶ processing ──send ok───▶ sent   (terminal)
//!                                └─send fail─▶ failed (terminal)
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Strongly-typed message identifier.
///
/// Wraps the `BIGSERIAL` primary key so message ids cannot be mixed with
/// other integers at compile time. Surfaced to operators as the
/// "internal id".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Message lifecycle status.
///
/// Maps to the `message_status` enum type in PostgreSQL. `Sent` and
/// `Failed` are terminal from the engine's point of view; a `failed` row is
/// never reconsidered and a `sent` row is never re-sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "message_status", rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Inserted and waiting to be claimed.
    Pending,

    /// Claimed by a dispatch tick; held by exactly one claimant.
    Processing,

    /// Delivered to the webhook. Terminal.
    Sent,

    /// Delivery failed. Terminal; no retry policy exists.
    Failed,
}

impl MessageStatus {
    /// Returns whether a transition to `next` is allowed by the lifecycle.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Sent)
                | (Self::Processing, Self::Failed)
        )
    }

    /// Returns whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Durable record of an outbound text message.
///
/// Rows are inserted with status `pending` and mutated only through the
/// claim/mark operations on the store. The engine never deletes rows.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    /// Primary key, monotonically assigned by the database.
    pub id: MessageId,

    /// Destination phone number. Opaque to the engine.
    pub recipient_phone: String,

    /// Message body. Length is bounded in code points both by the schema
    /// check and by the dispatcher's validation.
    pub content: String,

    /// Current lifecycle status.
    pub status: MessageStatus,

    /// Number of recorded failures. Incremented on every `mark_failed`.
    pub attempt_count: i32,

    /// Reason for the most recent failure, when any.
    pub last_error: Option<String>,

    /// Delivery timestamp, set when the row transitions to `sent`.
    pub sent_at: Option<DateTime<Utc>>,

    /// Opaque identifier assigned by the webhook on acceptance.
    pub remote_message_id: Option<String>,

    /// Insertion timestamp.
    pub created_at: DateTime<Utc>,

    /// Bumped on every state transition.
    pub updated_at: DateTime<Utc>,
}

/// Parameters for inserting a new pending message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    /// Destination phone number. Must be non-empty.
    pub recipient_phone: String,

    /// Message body.
    pub content: String,
}

impl NewMessage {
    /// Convenience constructor.
    pub fn new(recipient_phone: impl Into<String>, content: impl Into<String>) -> Self {
        Self { recipient_phone: recipient_phone.into(), content: content.into() }
    }
}
