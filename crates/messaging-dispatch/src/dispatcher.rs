//! Batch dispatcher: validation, webhook invocation, outcome recording.
//!
//! Processes one claimed batch sequentially in the FIFO order the store
//! returned it. Every per-message outcome is recorded through the
//! [`Outcomes`] capability; recording failures are logged and never abort
//! the rest of the batch.

use std::{future::Future, pin::Pin, sync::Arc};

use messaging_core::{Clock, CoreError, Message, MessageId, MessageStore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{cache::SentCache, client::WebhookClient};

/// Per-message outcome recorder.
///
/// The dispatcher's only coupling to persistence. Production composes the
/// store and the sent cache via [`StoreOutcomes`]; tests substitute
/// recording doubles.
pub trait Outcomes: Send + Sync + 'static {
    /// Records a successful send: the row transitions to `sent` and the
    /// remote id is retained for correlation.
    fn record_sent(
        &self,
        id: MessageId,
        remote_message_id: String,
    ) -> Pin<Box<dyn Future<Output = Result<(), CoreError>> + Send + '_>>;

    /// Records a failed send with its reason.
    fn record_failed(
        &self,
        id: MessageId,
        reason: String,
    ) -> Pin<Box<dyn Future<Output = Result<(), CoreError>> + Send + '_>>;
}

/// Production outcome recorder: database first, cache best-effort.
pub struct StoreOutcomes {
    store: Arc<dyn MessageStore>,
    cache: Arc<dyn SentCache>,
    clock: Arc<dyn Clock>,
}

impl StoreOutcomes {
    /// Composes the store, the sent cache, and a clock for cache timestamps.
    pub fn new(
        store: Arc<dyn MessageStore>,
        cache: Arc<dyn SentCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, cache, clock }
    }
}

impl Outcomes for StoreOutcomes {
    fn record_sent(
        &self,
        id: MessageId,
        remote_message_id: String,
    ) -> Pin<Box<dyn Future<Output = Result<(), CoreError>> + Send + '_>> {
        Box::pin(async move {
            self.store.mark_sent(id, remote_message_id.clone()).await?;

            // The database outcome is already committed; a cache failure
            // must not surface to the dispatcher.
            let sent_at = self.clock.now_utc();
            if let Err(cache_error) =
                self.cache.store_sent(id, remote_message_id, sent_at).await
            {
                warn!(message_id = %id, error = %cache_error, "failed to cache sent message");
            }

            Ok(())
        })
    }

    fn record_failed(
        &self,
        id: MessageId,
        reason: String,
    ) -> Pin<Box<dyn Future<Output = Result<(), CoreError>> + Send + '_>> {
        Box::pin(async move { self.store.mark_failed(id, reason).await })
    }
}

/// Counters for one processed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Messages accepted by the webhook.
    pub sent: usize,

    /// Messages that failed validation or delivery.
    pub failed: usize,
}

/// Validates and delivers one claimed batch of messages.
pub struct Dispatcher {
    client: WebhookClient,
    outcomes: Arc<dyn Outcomes>,
    content_max: usize,
}

impl Dispatcher {
    /// Creates a dispatcher with the given content-length bound in code
    /// points.
    pub fn new(client: WebhookClient, outcomes: Arc<dyn Outcomes>, content_max: usize) -> Self {
        Self { client, outcomes, content_max }
    }

    /// Processes a batch sequentially, returning sent/failed counters.
    ///
    /// When cancellation fires between messages the remaining rows are left
    /// in `processing` for operator reconciliation; a cancellation observed
    /// mid-send is recorded as that message's failure.
    pub async fn process_batch(
        &self,
        messages: Vec<Message>,
        cancel: &CancellationToken,
    ) -> BatchStats {
        let mut stats = BatchStats::default();

        for message in messages {
            if cancel.is_cancelled() {
                warn!(
                    message_id = %message.id,
                    "batch cancelled; remaining messages stay in processing"
                );
                break;
            }

            let length = message.content.chars().count();
            if length > self.content_max {
                stats.failed += 1;
                self.record_failed(
                    message.id,
                    format!("content exceeds {} chars", self.content_max),
                )
                .await;
                continue;
            }

            match self.client.send(&message.recipient_phone, &message.content, cancel).await {
                Ok(remote_message_id) => {
                    stats.sent += 1;
                    info!(
                        message_id = %message.id,
                        remote_message_id = %remote_message_id,
                        "message sent"
                    );
                    if let Err(outcome_error) =
                        self.outcomes.record_sent(message.id, remote_message_id).await
                    {
                        error!(
                            message_id = %message.id,
                            error = %outcome_error,
                            "failed to record sent outcome"
                        );
                    }
                },
                Err(send_error) => {
                    stats.failed += 1;
                    warn!(
                        message_id = %message.id,
                        error = %send_error,
                        "message delivery failed"
                    );
                    self.record_failed(message.id, send_error.to_string()).await;
                },
            }
        }

        stats
    }

    async fn record_failed(&self, id: MessageId, reason: String) {
        if let Err(outcome_error) = self.outcomes.record_failed(id, reason).await {
            error!(
                message_id = %id,
                error = %outcome_error,
                "failed to record failed outcome"
            );
        }
    }
}
