//! In-process fan-out of `JobEvent`s.
//!
//! The orchestrator and executor publish into a `tokio::sync::broadcast`
//! channel. Publishing never blocks and succeeds with zero subscribers, so
//! observers cannot slow job processing down. A subscriber that falls more
//! than the channel capacity behind loses the oldest events.

use jobflow_types::event::JobEvent;
use jobflow_types::job::JobId;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Default channel capacity used by the orchestrator.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Shared publisher for job lifecycle events. Clones publish into the same
/// channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Receive only the events of one job.
    pub fn subscribe_job(&self, job_id: JobId) -> JobSubscription {
        JobSubscription {
            job_id,
            receiver: self.sender.subscribe(),
        }
    }

    pub fn publish(&self, event: JobEvent) {
        tracing::trace!(job_id = %event.job_id(), ?event, "job event");
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

/// Event stream filtered to a single job.
pub struct JobSubscription {
    job_id: JobId,
    receiver: broadcast::Receiver<JobEvent>,
}

impl JobSubscription {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Next event for this job, or `None` once every publisher is gone.
    ///
    /// Lag is logged and skipped; the stream resumes at the oldest retained
    /// event.
    pub async fn next(&mut self) -> Option<JobEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.job_id() == self.job_id => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(job_id = %self.job_id, skipped, "job subscription lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Wait until the current attempt ends (succeeded, retrying, or failed).
    pub async fn attempt_end(&mut self) -> Option<JobEvent> {
        while let Some(event) = self.next().await {
            if event.ends_attempt() {
                return Some(event);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claimed(job_id: JobId) -> JobEvent {
        JobEvent::JobClaimed { job_id, attempt: 1 }
    }

    #[tokio::test]
    async fn every_subscriber_sees_each_event() {
        let bus = EventBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.clone().subscribe();
        let job_id = JobId::new();

        bus.publish(claimed(job_id));

        assert_eq!(first.recv().await.unwrap().job_id(), job_id);
        assert_eq!(second.recv().await.unwrap().job_id(), job_id);
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.publish(claimed(JobId::new()));
        assert!(format!("{bus:?}").contains("subscribers: 0"));
    }

    #[tokio::test]
    async fn job_subscription_filters_other_jobs() {
        let bus = EventBus::new(16);
        let mine = JobId::new();
        let mut sub = bus.subscribe_job(mine);
        assert_eq!(sub.job_id(), mine);

        bus.publish(claimed(JobId::new()));
        bus.publish(JobEvent::StepStarted {
            job_id: mine,
            step_id: "a".to_string(),
            tool_id: "t1".to_string(),
        });

        let event = sub.next().await.unwrap();
        assert!(matches!(event, JobEvent::StepStarted { ref step_id, .. } if step_id == "a"));
    }

    #[tokio::test]
    async fn attempt_end_skips_step_events() {
        let bus = EventBus::new(16);
        let job_id = JobId::new();
        let mut sub = bus.subscribe_job(job_id);

        bus.publish(claimed(job_id));
        bus.publish(JobEvent::StepCompleted {
            job_id,
            step_id: "a".to_string(),
            duration_ms: 3,
        });
        bus.publish(JobEvent::JobFailed {
            job_id,
            error: "boom".to_string(),
        });

        assert!(matches!(
            sub.attempt_end().await,
            Some(JobEvent::JobFailed { .. })
        ));
    }

    #[tokio::test]
    async fn subscription_ends_when_bus_dropped() {
        let bus = EventBus::new(4);
        let job_id = JobId::new();
        let mut sub = bus.subscribe_job(job_id);
        for _ in 0..10 {
            bus.publish(claimed(job_id));
        }
        drop(bus);

        // Lag is skipped, the retained events drain, then the stream closes.
        let mut seen = 0;
        while sub.next().await.is_some() {
            seen += 1;
        }
        assert_eq!(seen, 4);
    }
}
