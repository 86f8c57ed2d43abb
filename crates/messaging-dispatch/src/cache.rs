//! Write-through cache of successful sends.
//!
//! Keyed by `msg:<internal id>` with a JSON value of the remote id and the
//! delivery timestamp. The cache is strictly advisory: the database holds
//! the source of truth and every caller treats cache errors as non-fatal.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use messaging_core::MessageId;
use redis::aio::MultiplexedConnection;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::{error::CacheError, DEFAULT_CACHE_TTL_SECS};

/// Deadline for the startup connectivity probe.
const PING_DEADLINE: Duration = Duration::from_secs(2);

/// Cache of successfully sent messages.
///
/// Writes are last-write-wins per id; implementations never coordinate
/// concurrent writers beyond that.
pub trait SentCache: Send + Sync + 'static {
    /// Records a successful send under `msg:<id>`.
    fn store_sent(
        &self,
        id: MessageId,
        remote_message_id: String,
        sent_at: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>>;
}

/// Null collaborator used when no cache is configured.
///
/// Writes are silently skipped so the dispatcher needs no special casing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSentCache;

impl SentCache for NoopSentCache {
    fn store_sent(
        &self,
        _id: MessageId,
        _remote_message_id: String,
        _sent_at: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}

/// Connection parameters for the Redis-backed cache.
#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    /// Redis address as `host:port`.
    pub addr: String,

    /// Optional auth password.
    pub password: Option<String>,

    /// Logical database index.
    pub db: i64,

    /// Time-to-live applied to every entry.
    pub ttl: Duration,
}

impl RedisCacheConfig {
    /// Creates a configuration with the default TTL and no auth.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            password: None,
            db: 0,
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        }
    }

    fn url(&self) -> String {
        match &self.password {
            Some(password) => format!("redis://:{}@{}/{}", password, self.addr, self.db),
            None => format!("redis://{}/{}", self.addr, self.db),
        }
    }
}

/// Serialized cache value.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SentValue<'a> {
    remote_message_id: &'a str,
    sent_at: DateTime<Utc>,
}

/// Redis-backed sent cache using `SETEX` for per-entry expiry.
pub struct RedisSentCache {
    conn: Arc<Mutex<MultiplexedConnection>>,
    ttl_secs: u64,
}

impl RedisSentCache {
    /// Connects to Redis and verifies the connection with a bounded PING.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` when the address is invalid, the connection
    /// cannot be established, or the probe does not answer in time.
    pub async fn connect(config: &RedisCacheConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.url())?;
        let mut conn = client.get_multiplexed_async_connection().await?;

        let ping = async { redis::cmd("PING").query_async::<_, String>(&mut conn).await };
        tokio::time::timeout(PING_DEADLINE, ping)
            .await
            .map_err(|_| CacheError::PingTimeout { seconds: PING_DEADLINE.as_secs() })??;

        info!(addr = %config.addr, ttl_secs = config.ttl.as_secs(), "sent cache connected");

        Ok(Self { conn: Arc::new(Mutex::new(conn)), ttl_secs: config.ttl.as_secs().max(1) })
    }
}

impl SentCache for RedisSentCache {
    fn store_sent(
        &self,
        id: MessageId,
        remote_message_id: String,
        sent_at: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>> {
        let conn = self.conn.clone();
        let ttl_secs = self.ttl_secs;
        Box::pin(async move {
            let payload = serde_json::to_string(&SentValue {
                remote_message_id: &remote_message_id,
                sent_at,
            })?;

            let mut conn = conn.lock().await;
            redis::cmd("SETEX")
                .arg(format!("msg:{id}"))
                .arg(ttl_secs)
                .arg(payload)
                .query_async::<_, ()>(&mut *conn)
                .await?;

            Ok(())
        })
    }
}
