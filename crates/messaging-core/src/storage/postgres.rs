//! PostgreSQL implementation of the message store.
//!
//! Claiming uses `FOR UPDATE SKIP LOCKED` inside a single transaction so
//! concurrent dispatchers never block each other and never receive the same
//! row. If the process dies mid-claim the transaction's row locks die with
//! it and the rows become claimable again.

use std::{future::Future, pin::Pin, time::Duration};

use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{Message, MessageId, NewMessage},
    storage::{MessageStore, DEFAULT_LIST_LIMIT},
};

const MESSAGE_COLUMNS: &str = "id, recipient_phone, content, status, attempt_count, \
     last_error, sent_at, remote_message_id, created_at, updated_at";

/// Message store backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PostgresMessageStore {
    pool: PgPool,
}

impl PostgresMessageStore {
    /// Creates a new store over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Verifies connectivity with a bounded deadline.
    ///
    /// Used at startup so a misconfigured `POSTGRES_URL` fails fast instead
    /// of surfacing on the first tick.
    pub async fn ping(&self, deadline: Duration) -> Result<()> {
        let outcome = tokio::time::timeout(deadline, sqlx::query("SELECT 1").execute(&self.pool))
            .await
            .map_err(|_| {
                CoreError::Database(format!("database ping timed out after {deadline:?}"))
            })?;
        outcome?;
        Ok(())
    }
}

/// Creates the `messages` schema when it does not exist yet.
///
/// Idempotent; safe to run on every startup. The content length check and
/// the status enum mirror the invariants the dispatcher enforces in code.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r"
        DO $$ BEGIN
            CREATE TYPE message_status AS ENUM ('pending', 'processing', 'sent', 'failed');
        EXCEPTION
            WHEN duplicate_object THEN NULL;
        END $$
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS messages (
            id BIGSERIAL PRIMARY KEY,
            recipient_phone TEXT NOT NULL CHECK (recipient_phone <> ''),
            content TEXT NOT NULL CHECK (char_length(content) <= 160),
            status message_status NOT NULL DEFAULT 'pending',
            attempt_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            sent_at TIMESTAMPTZ,
            remote_message_id TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_messages_status_created_at
         ON messages (status, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_messages_sent_at
         ON messages (sent_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

impl MessageStore for PostgresMessageStore {
    fn claim_pending(
        &self,
        limit: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Message>>> + Send + '_>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            if limit <= 0 {
                return Err(CoreError::InvalidArgument("limit must be > 0".to_string()));
            }

            let mut tx = pool.begin().await?;

            let ids: Vec<i64> = sqlx::query_scalar(
                r"
                SELECT id FROM messages
                WHERE status = 'pending'
                ORDER BY created_at ASC, id ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
                ",
            )
            .bind(limit)
            .fetch_all(&mut *tx)
            .await?;

            if ids.is_empty() {
                tx.commit().await?;
                return Ok(Vec::new());
            }

            let mut messages: Vec<Message> = sqlx::query_as(&format!(
                r"
                UPDATE messages
                SET status = 'processing', updated_at = NOW()
                WHERE id = ANY($1)
                RETURNING {MESSAGE_COLUMNS}
                "
            ))
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await?;

            tx.commit().await?;

            // UPDATE .. RETURNING does not preserve the SELECT ordering
            messages.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

            Ok(messages)
        })
    }

    fn mark_sent(
        &self,
        id: MessageId,
        remote_message_id: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            sqlx::query(
                r"
                UPDATE messages
                SET status = 'sent',
                    sent_at = NOW(),
                    remote_message_id = $2,
                    updated_at = NOW()
                WHERE id = $1
                ",
            )
            .bind(id)
            .bind(&remote_message_id)
            .execute(&pool)
            .await?;

            Ok(())
        })
    }

    fn mark_failed(
        &self,
        id: MessageId,
        reason: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            sqlx::query(
                r"
                UPDATE messages
                SET status = 'failed',
                    last_error = $2,
                    attempt_count = attempt_count + 1,
                    updated_at = NOW()
                WHERE id = $1
                ",
            )
            .bind(id)
            .bind(&reason)
            .execute(&pool)
            .await?;

            Ok(())
        })
    }

    fn list_sent(
        &self,
        limit: i64,
        offset: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Message>>> + Send + '_>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let limit = if limit <= 0 { DEFAULT_LIST_LIMIT } else { limit };
            let offset = offset.max(0);

            let messages = sqlx::query_as(&format!(
                r"
                SELECT {MESSAGE_COLUMNS}
                FROM messages
                WHERE status = 'sent'
                ORDER BY sent_at DESC
                LIMIT $1 OFFSET $2
                "
            ))
            .bind(limit)
            .bind(offset)
            .fetch_all(&pool)
            .await?;

            Ok(messages)
        })
    }

    fn insert(
        &self,
        message: NewMessage,
    ) -> Pin<Box<dyn Future<Output = Result<MessageId>> + Send + '_>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let id: i64 = sqlx::query_scalar(
                r"
                INSERT INTO messages (recipient_phone, content)
                VALUES ($1, $2)
                RETURNING id
                ",
            )
            .bind(&message.recipient_phone)
            .bind(&message.content)
            .fetch_one(&pool)
            .await?;

            Ok(MessageId(id))
        })
    }

    fn find(
        &self,
        id: MessageId,
    ) -> Pin<Box<dyn Future<Output = Result<Message>> + Send + '_>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let message = sqlx::query_as(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
            ))
            .bind(id)
            .fetch_optional(&pool)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("message {id} not found")))?;

            Ok(message)
        })
    }
}
