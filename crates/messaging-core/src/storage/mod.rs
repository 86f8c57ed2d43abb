//! Storage layer for outbound messages.
//!
//! [`MessageStore`] abstracts the durable queue so the dispatch engine and
//! the control plane can be exercised against lightweight in-memory doubles,
//! while production uses [`PostgresMessageStore`]. All database access goes
//! through this module; SQL outside it is forbidden.

use std::{future::Future, pin::Pin};

use crate::{
    error::Result,
    models::{Message, MessageId, NewMessage},
};

pub mod postgres;

pub use postgres::PostgresMessageStore;

/// Storage operations required by the dispatch engine and control plane.
///
/// Claiming hands rows to exactly one caller at a time; the mark operations
/// record per-message outcomes. Implementations must uphold the lifecycle
/// invariants documented on [`crate::models::MessageStatus`].
pub trait MessageStore: Send + Sync + 'static {
    /// Claims up to `limit` pending messages, transitioning them to
    /// `processing`.
    ///
    /// Rows are claimed in FIFO order (oldest `created_at` first, ties
    /// broken by insertion order) and are guaranteed not to be handed to
    /// any concurrent claimant. Rows left in `processing` by a crashed
    /// claimant stay there until an operator reconciles them; no reaper
    /// exists.
    ///
    /// Fails with `InvalidArgument` when `limit <= 0`. A claim that matches
    /// zero rows commits cleanly and returns an empty vec.
    fn claim_pending(
        &self,
        limit: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Message>>> + Send + '_>>;

    /// Marks a message as sent, recording the webhook-assigned remote id
    /// and the delivery timestamp. `sent` is terminal.
    fn mark_sent(
        &self,
        id: MessageId,
        remote_message_id: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Marks a message as failed, recording the reason and incrementing the
    /// attempt counter. `failed` is terminal; the counter still accumulates
    /// should a failure be recorded more than once.
    fn mark_failed(
        &self,
        id: MessageId,
        reason: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Lists sent messages, most recently sent first.
    ///
    /// `limit <= 0` falls back to 50; a negative `offset` is clamped to 0.
    fn list_sent(
        &self,
        limit: i64,
        offset: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Message>>> + Send + '_>>;

    /// Inserts a new pending message and returns its id.
    fn insert(
        &self,
        message: NewMessage,
    ) -> Pin<Box<dyn Future<Output = Result<MessageId>> + Send + '_>>;

    /// Fetches a single message by id.
    fn find(&self, id: MessageId)
        -> Pin<Box<dyn Future<Output = Result<Message>> + Send + '_>>;
}

/// Default page size applied by [`MessageStore::list_sent`] when the caller
/// passes a non-positive limit.
pub const DEFAULT_LIST_LIMIT: i64 = 50;
