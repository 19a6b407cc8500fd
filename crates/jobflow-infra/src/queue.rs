//! Queue transport selection.
//!
//! `QueueTransport` picks the backend named in `[queue] backend` and exposes
//! it through the core `Producer` and `Consumer` ports, so the rest of the
//! application is written against one concrete type.

use jobflow_core::queue::memory::ConsumerSettings;
use jobflow_core::queue::{Consumer, InMemoryQueue, MessageHandler, Producer, QueueError};
use jobflow_types::config::{QueueBackend, QueueConfig};
use jobflow_types::queue::QueueMessage;

use crate::sqlite::DatabasePool;
use crate::sqlite::queue::{SqliteQueue, SqliteQueueSettings};

/// The configured queue backend.
#[derive(Debug, Clone)]
pub enum QueueTransport {
    Memory(InMemoryQueue),
    Sqlite(SqliteQueue),
}

impl QueueTransport {
    /// Build the backend selected by `config`.
    ///
    /// The SQLite backend shares `pool` with the job store.
    pub fn from_config(config: &QueueConfig, pool: &DatabasePool) -> Self {
        match config.backend {
            QueueBackend::Memory => {
                tracing::debug!("using in-memory queue transport");
                Self::Memory(InMemoryQueue::new(ConsumerSettings::from(config)))
            }
            QueueBackend::Sqlite => {
                tracing::debug!("using sqlite queue transport");
                Self::Sqlite(SqliteQueue::new(
                    pool.clone(),
                    SqliteQueueSettings::from(config),
                ))
            }
        }
    }

    pub fn backend(&self) -> QueueBackend {
        match self {
            Self::Memory(_) => QueueBackend::Memory,
            Self::Sqlite(_) => QueueBackend::Sqlite,
        }
    }
}

impl Producer for QueueTransport {
    async fn send(&self, message: QueueMessage) -> Result<(), QueueError> {
        match self {
            Self::Memory(q) => q.send(message).await,
            Self::Sqlite(q) => q.send(message).await,
        }
    }
}

impl Consumer for QueueTransport {
    fn subscribe(&self, topic: &str, handler: MessageHandler) {
        match self {
            Self::Memory(q) => q.subscribe(topic, handler),
            Self::Sqlite(q) => q.subscribe(topic, handler),
        }
    }

    async fn start(&self) -> Result<(), QueueError> {
        match self {
            Self::Memory(q) => q.start().await,
            Self::Sqlite(q) => q.start().await,
        }
    }

    async fn stop(&self) -> Result<(), QueueError> {
        match self {
            Self::Memory(q) => q.stop().await,
            Self::Sqlite(q) => q.stop().await,
        }
    }
}
