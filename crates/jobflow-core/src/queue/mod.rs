//! Queue ports: message producers, consumers, and topic handlers.
//!
//! Delivery is at-least-once with no ordering guarantee across jobs. A
//! handler that returns `Err` asks the transport to redeliver the message;
//! a handler that returns `Ok` acknowledges it.
//!
//! Backends:
//! - `memory`: in-process channel (this crate)
//! - SQLite outbox table (jobflow-infra)

pub mod memory;

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use jobflow_types::queue::QueueMessage;
use thiserror::Error;

pub use memory::InMemoryQueue;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is closed")]
    Closed,

    #[error("failed to encode message: {0}")]
    Encode(String),

    #[error("queue storage error: {0}")]
    Storage(String),

    #[error("consumer task failed: {0}")]
    Consumer(String),
}

/// A handler's request for redelivery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Future returned by a topic handler.
pub type HandlerFuture = BoxFuture<'static, Result<(), HandlerError>>;

/// Callback invoked for each message of a subscribed topic.
pub type MessageHandler = Arc<dyn Fn(QueueMessage) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as a `MessageHandler`.
pub fn handler<F, Fut>(f: F) -> MessageHandler
where
    F: Fn(QueueMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(move |msg| Box::pin(f(msg)))
}

/// Topic -> handler table owned by one consumer instance.
///
/// At most one handler per topic; subscribing again replaces it.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: Arc<DashMap<String, MessageHandler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `topic`. Returns `true` if one was replaced.
    pub fn insert(&self, topic: &str, handler: MessageHandler) -> bool {
        let replaced = self.handlers.insert(topic.to_string(), handler).is_some();
        if replaced {
            tracing::debug!(topic, "replaced existing queue handler");
        }
        replaced
    }

    pub fn get(&self, topic: &str) -> Option<MessageHandler> {
        self.handlers.get(topic).map(|h| Arc::clone(&h))
    }

    pub fn topics(&self) -> Vec<String> {
        self.handlers.iter().map(|e| e.key().clone()).collect()
    }

    /// Run the handler for `message`'s topic.
    pub async fn dispatch(&self, message: QueueMessage) -> Delivery {
        let Some(handler) = self.get(&message.message_type) else {
            return Delivery::Unhandled;
        };
        match handler(message).await {
            Ok(()) => Delivery::Handled,
            Err(e) => Delivery::Failed(e),
        }
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerTable")
            .field("topics", &self.topics())
            .finish()
    }
}

/// Outcome of dispatching one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The handler acknowledged the message.
    Handled,
    /// No handler is subscribed to the topic.
    Unhandled,
    /// The handler asked for redelivery.
    Failed(HandlerError),
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Publishes messages onto the transport.
pub trait Producer: Send + Sync {
    fn send(
        &self,
        message: QueueMessage,
    ) -> impl Future<Output = Result<(), QueueError>> + Send;
}

/// Delivers messages to per-topic handlers.
pub trait Consumer: Send + Sync {
    /// Register `handler` for `topic`, replacing any previous handler.
    fn subscribe(&self, topic: &str, handler: MessageHandler);

    /// Begin delivering messages. Starting a running consumer is a no-op.
    fn start(&self) -> impl Future<Output = Result<(), QueueError>> + Send;

    /// Stop delivering and wait for in-flight handlers to finish.
    fn stop(&self) -> impl Future<Output = Result<(), QueueError>> + Send;
}
