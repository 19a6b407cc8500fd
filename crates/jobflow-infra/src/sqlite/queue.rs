//! Durable queue transport backed by the `queue_messages` table.
//!
//! Producers insert rows. A consumer polls for rows on its subscribed topics
//! and leases each batch by setting `locked_until`, so concurrent consumers
//! sharing the database do not receive the same row while the lease holds.
//! Acknowledged rows are deleted; failed ones are released with an
//! incremented `retry_count`. A row whose lease expires (consumer crashed)
//! becomes visible again, which keeps delivery at-least-once.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use jobflow_core::queue::memory::ConsumerSettings;
use jobflow_core::queue::{Consumer, Delivery, HandlerTable, MessageHandler, Producer, QueueError};
use jobflow_types::config::QueueConfig;
use jobflow_types::queue::QueueMessage;
use sqlx::Row;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime};

/// Polling and leasing knobs for `SqliteQueue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqliteQueueSettings {
    pub consumer: ConsumerSettings,
    pub poll_interval: Duration,
    pub batch_size: u32,
    pub visibility_timeout: Duration,
}

impl From<&QueueConfig> for SqliteQueueSettings {
    fn from(config: &QueueConfig) -> Self {
        Self {
            consumer: ConsumerSettings::from(config),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            batch_size: config.batch_size.max(1),
            visibility_timeout: Duration::from_secs(config.visibility_timeout_secs.max(1)),
        }
    }
}

impl Default for SqliteQueueSettings {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Inner {
    pool: DatabasePool,
    handlers: HandlerTable,
    settings: SqliteQueueSettings,
    running: Mutex<Option<Running>>,
}

/// Table-backed `Producer` + `Consumer`.
#[derive(Clone)]
pub struct SqliteQueue {
    inner: Arc<Inner>,
}

impl SqliteQueue {
    pub fn new(pool: DatabasePool, settings: SqliteQueueSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                handlers: HandlerTable::new(),
                settings,
                running: Mutex::new(None),
            }),
        }
    }

    /// Number of messages still stored, leased or not.
    pub async fn depth(&self) -> Result<u64, QueueError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM queue_messages")
            .fetch_one(&self.inner.pool.reader)
            .await
            .map_err(storage_error)?;
        let n: i64 = row.try_get("n").map_err(storage_error)?;
        Ok(n.max(0) as u64)
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .running
            .lock()
            .map(|r| r.is_some())
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for SqliteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteQueue")
            .field("handlers", &self.inner.handlers)
            .field("settings", &self.inner.settings)
            .finish()
    }
}

fn storage_error(e: sqlx::Error) -> QueueError {
    QueueError::Storage(e.to_string())
}

impl Producer for SqliteQueue {
    async fn send(&self, message: QueueMessage) -> Result<(), QueueError> {
        let payload =
            serde_json::to_string(&message.payload).map_err(|e| QueueError::Encode(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO queue_messages (id, topic, payload, timestamp, retry_count)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(message.id.to_string())
        .bind(&message.message_type)
        .bind(&payload)
        .bind(format_datetime(&message.timestamp))
        .bind(message.redeliveries() as i64)
        .execute(&self.inner.pool.writer)
        .await
        .map_err(storage_error)?;

        Ok(())
    }
}

impl Consumer for SqliteQueue {
    fn subscribe(&self, topic: &str, handler: MessageHandler) {
        self.inner.handlers.insert(topic, handler);
    }

    async fn start(&self) -> Result<(), QueueError> {
        let mut running = self
            .inner
            .running
            .lock()
            .map_err(|e| QueueError::Consumer(e.to_string()))?;
        if running.is_some() {
            debug!("sqlite consumer already running");
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_loop(Arc::clone(&self.inner), cancel.clone()));
        *running = Some(Running { cancel, task });
        debug!(topics = ?self.inner.handlers.topics(), "sqlite consumer started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), QueueError> {
        let running = self
            .inner
            .running
            .lock()
            .map_err(|e| QueueError::Consumer(e.to_string()))?
            .take();
        let Some(Running { cancel, task }) = running else {
            return Ok(());
        };
        cancel.cancel();
        task.await.map_err(|e| QueueError::Consumer(e.to_string()))?;
        debug!("sqlite consumer stopped");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Delivery loop
// ---------------------------------------------------------------------------

async fn poll_loop(inner: Arc<Inner>, cancel: CancellationToken) {
    let limit = inner.settings.consumer.max_in_flight;
    let permits = Arc::new(Semaphore::new(limit));

    'outer: loop {
        let fetched = match lease_batch(&inner).await {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "failed to lease queue messages");
                Vec::new()
            }
        };
        let full = fetched.len() as u32 >= inner.settings.batch_size;

        let mut pending = fetched.into_iter();
        while let Some(message) = pending.next() {
            let permit = tokio::select! {
                _ = cancel.cancelled() => {
                    release(&inner, &message).await;
                    for rest in pending.by_ref() {
                        release(&inner, &rest).await;
                    }
                    break 'outer;
                }
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break 'outer,
                },
            };
            let inner = Arc::clone(&inner);
            tokio::spawn(async move {
                let _permit = permit;
                deliver(&inner, message).await;
            });
        }

        if full {
            if cancel.is_cancelled() {
                break;
            }
            continue;
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(inner.settings.poll_interval) => {}
        }
    }

    let _ = permits.acquire_many(limit as u32).await;
}

/// Lease up to `batch_size` visible messages on subscribed topics, oldest first.
async fn lease_batch(inner: &Inner) -> Result<Vec<QueueMessage>, QueueError> {
    let topics = inner.handlers.topics();
    if topics.is_empty() {
        return Ok(Vec::new());
    }

    let now = Utc::now();
    let lease = chrono::Duration::from_std(inner.settings.visibility_timeout)
        .unwrap_or_else(|_| chrono::Duration::seconds(300));
    let placeholders = vec!["?"; topics.len()].join(", ");
    let sql = format!(
        r#"UPDATE queue_messages SET locked_until = ?
           WHERE id IN (
               SELECT id FROM queue_messages
               WHERE topic IN ({placeholders})
                 AND (locked_until IS NULL OR locked_until < ?)
               ORDER BY timestamp ASC
               LIMIT ?
           )
           RETURNING id, topic, payload, timestamp, retry_count"#
    );

    let mut query = sqlx::query(&sql).bind(format_datetime(&(now + lease)));
    for topic in &topics {
        query = query.bind(topic.as_str());
    }
    let rows = query
        .bind(format_datetime(&now))
        .bind(inner.settings.batch_size as i64)
        .fetch_all(&inner.pool.writer)
        .await
        .map_err(storage_error)?;

    let mut messages = Vec::with_capacity(rows.len());
    for row in &rows {
        match message_from_row(row) {
            Ok(message) => messages.push(message),
            Err(e) => {
                // An undecodable row can never be delivered; drop it.
                let id: Option<String> = row.try_get("id").ok();
                error!(message_id = ?id, error = %e, "dropping malformed queue row");
                if let Some(id) = id {
                    let _ = delete_row(inner, &id).await;
                }
            }
        }
    }
    // RETURNING order is unspecified.
    messages.sort_by_key(|m| m.timestamp);
    Ok(messages)
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<QueueMessage, QueueError> {
    let id: String = row.try_get("id").map_err(storage_error)?;
    let topic: String = row.try_get("topic").map_err(storage_error)?;
    let payload: String = row.try_get("payload").map_err(storage_error)?;
    let timestamp: String = row.try_get("timestamp").map_err(storage_error)?;
    let retry_count: i64 = row.try_get("retry_count").map_err(storage_error)?;

    Ok(QueueMessage {
        id: Uuid::parse_str(&id).map_err(|e| QueueError::Storage(format!("invalid id: {e}")))?,
        message_type: topic,
        payload: serde_json::from_str(&payload)
            .map_err(|e| QueueError::Storage(format!("invalid payload: {e}")))?,
        timestamp: parse_datetime(&timestamp).map_err(|e| QueueError::Storage(e.to_string()))?,
        retry_count: (retry_count > 0).then_some(retry_count as u32),
    })
}

async fn deliver(inner: &Inner, message: QueueMessage) {
    let topic = message.message_type.clone();
    let id = message.id.to_string();

    let outcome = match inner.handlers.dispatch(message.clone()).await {
        Delivery::Handled => delete_row(inner, &id).await,
        Delivery::Unhandled => {
            warn!(%topic, message_id = %id, "no handler subscribed, dropping message");
            delete_row(inner, &id).await
        }
        Delivery::Failed(err) => {
            let attempts = message.redeliveries();
            if attempts < inner.settings.consumer.max_redeliveries {
                warn!(%topic, message_id = %id, attempt = attempts + 1, error = %err, "handler failed, redelivering");
                requeue(inner, &id).await
            } else {
                error!(%topic, message_id = %id, error = %err, "handler failed, redeliveries exhausted");
                delete_row(inner, &id).await
            }
        }
    };

    if let Err(e) = outcome {
        // The lease will expire and the message will be delivered again.
        error!(message_id = %id, error = %e, "failed to settle queue message");
    }
}

async fn delete_row(inner: &Inner, id: &str) -> Result<(), QueueError> {
    sqlx::query("DELETE FROM queue_messages WHERE id = ?")
        .bind(id)
        .execute(&inner.pool.writer)
        .await
        .map_err(storage_error)?;
    Ok(())
}

async fn requeue(inner: &Inner, id: &str) -> Result<(), QueueError> {
    sqlx::query(
        "UPDATE queue_messages SET retry_count = retry_count + 1, locked_until = NULL WHERE id = ?",
    )
    .bind(id)
    .execute(&inner.pool.writer)
    .await
    .map_err(storage_error)?;
    Ok(())
}

/// Give a leased but undelivered message back without counting an attempt.
async fn release(inner: &Inner, message: &QueueMessage) {
    let result = sqlx::query("UPDATE queue_messages SET locked_until = NULL WHERE id = ?")
        .bind(message.id.to_string())
        .execute(&inner.pool.writer)
        .await;
    if let Err(e) = result {
        warn!(message_id = %message.id, error = %e, "failed to release queue message");
    }
}
