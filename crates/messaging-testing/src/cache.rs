//! Cache doubles for dispatcher tests.

use std::{
    future::Future,
    pin::Pin,
    sync::Mutex,
};

use chrono::{DateTime, Utc};
use messaging_core::MessageId;
use messaging_dispatch::{CacheError, SentCache};

/// One recorded cache write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSend {
    /// Internal message id.
    pub id: MessageId,

    /// Remote id assigned by the webhook.
    pub remote_message_id: String,

    /// Timestamp recorded with the entry.
    pub sent_at: DateTime<Utc>,
}

/// [`SentCache`] double that records every write.
///
/// Construct with [`RecordingCache::failing`] to have every write error,
/// which proves cache failures never affect the database outcome.
#[derive(Default)]
pub struct RecordingCache {
    calls: Mutex<Vec<CachedSend>>,
    fail: bool,
}

impl RecordingCache {
    /// Creates a cache that accepts every write.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache whose writes all fail.
    pub fn failing() -> Self {
        Self { calls: Mutex::new(Vec::new()), fail: true }
    }

    /// Snapshot of all recorded writes in order.
    pub fn calls(&self) -> Vec<CachedSend> {
        self.calls.lock().expect("cache mutex poisoned").clone()
    }

    /// Returns whether a write for `id` was recorded.
    pub fn contains(&self, id: MessageId) -> bool {
        self.calls().iter().any(|call| call.id == id)
    }
}

impl SentCache for RecordingCache {
    fn store_sent(
        &self,
        id: MessageId,
        remote_message_id: String,
        sent_at: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>> {
        Box::pin(async move {
            if self.fail {
                return Err(CacheError::Unavailable("injected cache failure".to_string()));
            }

            self.calls
                .lock()
                .expect("cache mutex poisoned")
                .push(CachedSend { id, remote_message_id, sent_at });

            Ok(())
        })
    }
}
