//! Queue message envelope types.
//!
//! Messages are ephemeral: they live only inside the transport and are never
//! persisted by the job store. Delivery is at-least-once with no ordering
//! across jobs, so every consumer of these types must tolerate duplicates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::{Job, JobId};
use crate::workflow::WorkflowDefinition;

/// Topic (message type) announcing a newly admitted job.
pub const TOPIC_JOB_CREATED: &str = "job.created";

/// Transport envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMessage {
    pub id: Uuid,
    /// Topic the message is routed by.
    #[serde(rename = "type")]
    pub message_type: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    /// Number of times delivery has been retried after a handler failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

impl QueueMessage {
    /// Build a fresh message for `topic`.
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            message_type: topic.into(),
            payload,
            timestamp: Utc::now(),
            retry_count: None,
        }
    }

    /// Build the `job.created` announcement for an admitted job.
    pub fn job_created(job: &Job) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_value(JobCreatedPayload {
            job_id: job.job_id,
            user_id: job.user_id.clone(),
            workflow_definition: job.workflow_definition.clone(),
        })?;
        Ok(Self::new(TOPIC_JOB_CREATED, payload))
    }

    /// Delivery attempts already made beyond the first.
    pub fn redeliveries(&self) -> u32 {
        self.retry_count.unwrap_or(0)
    }

    /// Copy of this message marked for one more redelivery.
    pub fn redelivered(&self) -> Self {
        let mut next = self.clone();
        next.retry_count = Some(self.redeliveries() + 1);
        next
    }

    /// Decode the payload into a typed value.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Payload of a `job.created` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCreatedPayload {
    pub job_id: JobId,
    pub user_id: String,
    pub workflow_definition: WorkflowDefinition,
}
