//! In-memory message store mirroring the SQL semantics.

use std::{
    future::Future,
    pin::Pin,
    sync::Mutex,
};

use chrono::Utc;
use messaging_core::{
    storage::DEFAULT_LIST_LIMIT, CoreError, Message, MessageId, MessageStatus, MessageStore,
    NewMessage, Result,
};

/// In-memory [`MessageStore`] with the same observable behavior as the
/// PostgreSQL implementation: FIFO claims, terminal marks, descending
/// `list_sent`, and the same argument validation.
///
/// Single-process only; there is no row locking because the mutex already
/// serializes claimants.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    rows: Vec<Message>,
    next_id: i64,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a pending message synchronously and returns its id.
    pub fn seed(&self, recipient_phone: impl Into<String>, content: impl Into<String>) -> MessageId {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.next_id += 1;
        let id = MessageId(inner.next_id);
        let now = Utc::now();
        inner.rows.push(Message {
            id,
            recipient_phone: recipient_phone.into(),
            content: content.into(),
            status: MessageStatus::Pending,
            attempt_count: 0,
            last_error: None,
            sent_at: None,
            remote_message_id: None,
            created_at: now,
            updated_at: now,
        });
        id
    }

    /// Returns a snapshot of the message with the given id.
    ///
    /// # Panics
    ///
    /// Panics when the id is unknown; tests seed every row they inspect.
    pub fn message(&self, id: MessageId) -> Message {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner
            .rows
            .iter()
            .find(|row| row.id == id)
            .cloned()
            .unwrap_or_else(|| panic!("message {id} not seeded"))
    }

    /// Returns all rows currently in the given status.
    pub fn in_status(&self, status: MessageStatus) -> Vec<Message> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner.rows.iter().filter(|row| row.status == status).cloned().collect()
    }
}

impl MessageStore for MemoryStore {
    fn claim_pending(
        &self,
        limit: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Message>>> + Send + '_>> {
        Box::pin(async move {
            if limit <= 0 {
                return Err(CoreError::InvalidArgument("limit must be > 0".to_string()));
            }

            let mut inner = self.inner.lock().expect("store mutex poisoned");
            let now = Utc::now();

            let mut pending: Vec<usize> = inner
                .rows
                .iter()
                .enumerate()
                .filter(|(_, row)| row.status == MessageStatus::Pending)
                .map(|(index, _)| index)
                .collect();
            pending.sort_by_key(|&index| (inner.rows[index].created_at, inner.rows[index].id));
            pending.truncate(usize::try_from(limit).unwrap_or(usize::MAX));

            let mut claimed = Vec::with_capacity(pending.len());
            for index in pending {
                let row = &mut inner.rows[index];
                row.status = MessageStatus::Processing;
                row.updated_at = now;
                claimed.push(row.clone());
            }

            Ok(claimed)
        })
    }

    fn mark_sent(
        &self,
        id: MessageId,
        remote_message_id: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().expect("store mutex poisoned");
            let row = inner
                .rows
                .iter_mut()
                .find(|row| row.id == id)
                .ok_or_else(|| CoreError::NotFound(format!("message {id} not found")))?;

            let now = Utc::now();
            row.status = MessageStatus::Sent;
            row.sent_at = Some(now);
            row.remote_message_id = Some(remote_message_id);
            row.updated_at = now;

            Ok(())
        })
    }

    fn mark_failed(
        &self,
        id: MessageId,
        reason: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().expect("store mutex poisoned");
            let row = inner
                .rows
                .iter_mut()
                .find(|row| row.id == id)
                .ok_or_else(|| CoreError::NotFound(format!("message {id} not found")))?;

            row.status = MessageStatus::Failed;
            row.last_error = Some(reason);
            row.attempt_count += 1;
            row.updated_at = Utc::now();

            Ok(())
        })
    }

    fn list_sent(
        &self,
        limit: i64,
        offset: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Message>>> + Send + '_>> {
        Box::pin(async move {
            let limit = if limit <= 0 { DEFAULT_LIST_LIMIT } else { limit };
            let offset = offset.max(0);

            let inner = self.inner.lock().expect("store mutex poisoned");
            let mut sent: Vec<Message> = inner
                .rows
                .iter()
                .filter(|row| row.status == MessageStatus::Sent)
                .cloned()
                .collect();
            sent.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));

            Ok(sent
                .into_iter()
                .skip(usize::try_from(offset).unwrap_or(0))
                .take(usize::try_from(limit).unwrap_or(usize::MAX))
                .collect())
        })
    }

    fn insert(
        &self,
        message: NewMessage,
    ) -> Pin<Box<dyn Future<Output = Result<MessageId>> + Send + '_>> {
        Box::pin(async move { Ok(self.seed(message.recipient_phone, message.content)) })
    }

    fn find(
        &self,
        id: MessageId,
    ) -> Pin<Box<dyn Future<Output = Result<Message>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.inner.lock().expect("store mutex poisoned");
            inner
                .rows
                .iter()
                .find(|row| row.id == id)
                .cloned()
                .ok_or_else(|| CoreError::NotFound(format!("message {id} not found")))
        })
    }
}

/// Store double that fails every operation with a database error.
///
/// Used to exercise the log-and-continue paths around store failures.
pub struct FailingStore {
    detail: String,
}

impl FailingStore {
    /// Creates a failing store; `detail` appears in every error.
    pub fn new(detail: impl Into<String>) -> Self {
        Self { detail: detail.into() }
    }

    fn error(&self) -> CoreError {
        CoreError::Database(self.detail.clone())
    }
}

impl MessageStore for FailingStore {
    fn claim_pending(
        &self,
        _limit: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Message>>> + Send + '_>> {
        Box::pin(async move { Err(self.error()) })
    }

    fn mark_sent(
        &self,
        _id: MessageId,
        _remote_message_id: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { Err(self.error()) })
    }

    fn mark_failed(
        &self,
        _id: MessageId,
        _reason: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { Err(self.error()) })
    }

    fn list_sent(
        &self,
        _limit: i64,
        _offset: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Message>>> + Send + '_>> {
        Box::pin(async move { Err(self.error()) })
    }

    fn insert(
        &self,
        _message: NewMessage,
    ) -> Pin<Box<dyn Future<Output = Result<MessageId>> + Send + '_>> {
        Box::pin(async move { Err(self.error()) })
    }

    fn find(
        &self,
        _id: MessageId,
    ) -> Pin<Box<dyn Future<Output = Result<Message>> + Send + '_>> {
        Box::pin(async move { Err(self.error()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn claims_are_fifo_and_bounded() {
        let store = MemoryStore::new();
        let first = store.seed("+361", "a");
        let second = store.seed("+362", "b");
        let third = store.seed("+363", "c");

        let claimed = store.claim_pending(2).await.unwrap();
        assert_eq!(claimed.iter().map(|m| m.id).collect::<Vec<_>>(), vec![first, second]);
        assert!(claimed.iter().all(|m| m.status == MessageStatus::Processing));

        let rest = store.claim_pending(2).await.unwrap();
        assert_eq!(rest.iter().map(|m| m.id).collect::<Vec<_>>(), vec![third]);
    }

    #[tokio::test]
    async fn claim_validates_limit() {
        let store = MemoryStore::new();
        let err = store.claim_pending(0).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn marks_set_terminal_fields() {
        let store = MemoryStore::new();
        let sent_id = store.seed("+361", "ok");
        let failed_id = store.seed("+362", "bad");
        store.claim_pending(2).await.unwrap();

        store.mark_sent(sent_id, "r-1".to_string()).await.unwrap();
        store.mark_failed(failed_id, "boom".to_string()).await.unwrap();

        let sent = store.message(sent_id);
        assert_eq!(sent.status, MessageStatus::Sent);
        assert!(sent.sent_at.is_some());
        assert_eq!(sent.remote_message_id.as_deref(), Some("r-1"));

        let failed = store.message(failed_id);
        assert_eq!(failed.status, MessageStatus::Failed);
        assert_eq!(failed.attempt_count, 1);
        assert_eq!(failed.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn list_sent_defaults_and_ordering() {
        let store = MemoryStore::new();
        for n in 0..3 {
            let id = store.seed("+361", format!("m{n}"));
            store.claim_pending(1).await.unwrap();
            store.mark_sent(id, format!("r-{n}")).await.unwrap();
        }

        let listed = store.list_sent(0, -1).await.unwrap();
        assert_eq!(listed.len(), 3);
        for pair in listed.windows(2) {
            assert!(pair[0].sent_at >= pair[1].sent_at);
        }
    }
}
