//! In-process queue backed by a tokio channel.
//!
//! One `InMemoryQueue` is both the producer and the consumer; clones share
//! the channel and the handler table. Messages do not survive a restart.

use std::sync::{Arc, Mutex};

use jobflow_types::config::QueueConfig;
use jobflow_types::queue::QueueMessage;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::{Consumer, Delivery, HandlerTable, MessageHandler, Producer, QueueError};

/// Delivery limits for a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerSettings {
    /// Handler failures tolerated before a message is dropped.
    pub max_redeliveries: u32,
    /// Maximum handlers running at once.
    pub max_in_flight: usize,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for ConsumerSettings {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_redeliveries: config.max_redeliveries,
            max_in_flight: config.max_in_flight.max(1),
        }
    }
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Inner {
    sender: mpsc::UnboundedSender<QueueMessage>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<QueueMessage>>,
    handlers: HandlerTable,
    settings: ConsumerSettings,
    running: Mutex<Option<Running>>,
}

/// In-memory `Producer` + `Consumer`.
#[derive(Clone)]
pub struct InMemoryQueue {
    inner: Arc<Inner>,
}

impl InMemoryQueue {
    pub fn new(settings: ConsumerSettings) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                sender,
                receiver: tokio::sync::Mutex::new(receiver),
                handlers: HandlerTable::new(),
                settings,
                running: Mutex::new(None),
            }),
        }
    }

    /// Whether the delivery loop is active.
    pub fn is_running(&self) -> bool {
        self.inner
            .running
            .lock()
            .map(|r| r.is_some())
            .unwrap_or(false)
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new(ConsumerSettings::default())
    }
}

impl std::fmt::Debug for InMemoryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryQueue")
            .field("handlers", &self.inner.handlers)
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl Producer for InMemoryQueue {
    async fn send(&self, message: QueueMessage) -> Result<(), QueueError> {
        self.inner
            .sender
            .send(message)
            .map_err(|_| QueueError::Closed)
    }
}

impl Consumer for InMemoryQueue {
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
            debug!("in-memory consumer already running");
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(consume_loop(Arc::clone(&self.inner), cancel.clone()));
        *running = Some(Running { cancel, task });
        debug!(topics = ?self.inner.handlers.topics(), "in-memory consumer started");
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
        debug!("in-memory consumer stopped");
        Ok(())
    }
}

/// Pull messages and hand each to its topic handler on its own task.
///
/// On cancellation the loop stops taking new messages, then waits for every
/// in-flight handler by reclaiming all permits.
async fn consume_loop(inner: Arc<Inner>, cancel: CancellationToken) {
    let limit = inner.settings.max_in_flight;
    let permits = Arc::new(Semaphore::new(limit));
    let mut receiver = inner.receiver.lock().await;

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = receiver.recv() => match message {
                Some(m) => m,
                None => break,
            },
        };

        let permit = tokio::select! {
            _ = cancel.cancelled() => {
                // Put it back so a later start() still sees it.
                let _ = inner.sender.send(message);
                break;
            }
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        let inner = Arc::clone(&inner);
        tokio::spawn(async move {
            let _permit = permit;
            deliver(&inner, message).await;
        });
    }

    let _ = permits.acquire_many(limit as u32).await;
}

async fn deliver(inner: &Inner, message: QueueMessage) {
    let topic = message.message_type.clone();
    match inner.handlers.dispatch(message.clone()).await {
        Delivery::Handled => {}
        Delivery::Unhandled => {
            warn!(%topic, message_id = %message.id, "no handler subscribed, dropping message");
        }
        Delivery::Failed(err) => {
            let attempts = message.redeliveries();
            if attempts < inner.settings.max_redeliveries {
                warn!(%topic, message_id = %message.id, attempt = attempts + 1, error = %err, "handler failed, redelivering");
                let _ = inner.sender.send(message.redelivered());
            } else {
                error!(%topic, message_id = %message.id, error = %err, "handler failed, redeliveries exhausted");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::queue::{HandlerError, handler};

    async fn wait_for(counter: &AtomicU32, expected: u32) {
        for _ in 0..200 {
            if counter.load(Ordering::SeqCst) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "timed out waiting for {expected}, got {}",
            counter.load(Ordering::SeqCst)
        );
    }

    fn counting(counter: Arc<AtomicU32>) -> MessageHandler {
        handler(move |_msg| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_delivers_to_subscribed_handler() {
        let queue = InMemoryQueue::default();
        let hits = Arc::new(AtomicU32::new(0));
        queue.subscribe("job.created", counting(Arc::clone(&hits)));
        queue.start().await.unwrap();
        assert!(queue.is_running());

        queue
            .send(QueueMessage::new("job.created", serde_json::json!({})))
            .await
            .unwrap();
        wait_for(&hits, 1).await;

        queue.stop().await.unwrap();
        assert!(!queue.is_running());
    }

    #[tokio::test]
    async fn test_messages_sent_before_start_are_kept() {
        let queue = InMemoryQueue::default();
        let hits = Arc::new(AtomicU32::new(0));
        queue.subscribe("t", counting(Arc::clone(&hits)));

        queue.send(QueueMessage::new("t", serde_json::json!(1))).await.unwrap();
        queue.send(QueueMessage::new("t", serde_json::json!(2))).await.unwrap();
        queue.start().await.unwrap();

        wait_for(&hits, 2).await;
        queue.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_handler_is_redelivered_until_limit() {
        let queue = InMemoryQueue::new(ConsumerSettings {
            max_redeliveries: 2,
            max_in_flight: 1,
        });
        let attempts = Arc::new(AtomicU32::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let attempts = Arc::clone(&attempts);
            let seen = Arc::clone(&seen);
            queue.subscribe(
                "t",
                handler(move |msg| {
                    let attempts = Arc::clone(&attempts);
                    let seen = Arc::clone(&seen);
                    async move {
                        seen.lock().unwrap().push(msg.retry_count);
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err(HandlerError::new("boom"))
                    }
                }),
            );
        }
        queue.start().await.unwrap();
        queue.send(QueueMessage::new("t", serde_json::json!({}))).await.unwrap();

        wait_for(&attempts, 3).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.stop().await.unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(*seen.lock().unwrap(), vec![None, Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn test_unhandled_topic_is_dropped() {
        let queue = InMemoryQueue::default();
        let hits = Arc::new(AtomicU32::new(0));
        queue.subscribe("known", counting(Arc::clone(&hits)));
        queue.start().await.unwrap();

        queue.send(QueueMessage::new("unknown", serde_json::json!({}))).await.unwrap();
        queue.send(QueueMessage::new("known", serde_json::json!({}))).await.unwrap();
        wait_for(&hits, 1).await;
        queue.stop().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_twice_and_stop_twice_are_noops() {
        let queue = InMemoryQueue::default();
        queue.start().await.unwrap();
        queue.start().await.unwrap();
        queue.stop().await.unwrap();
        queue.stop().await.unwrap();
    }
}
