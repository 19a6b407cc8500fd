//! Shared fixtures for orchestrator integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use jobflow_core::event::EventBus;
use jobflow_core::orchestrator::{JobProcessor, RetryPolicy};
use jobflow_core::repository::{InMemoryJobRepository, InMemoryToolRegistry, JobRepository};
use jobflow_core::service::JobStore;
use jobflow_core::tool::ToolClient;
use jobflow_core::workflow::WorkflowExecutor;
use jobflow_types::error::RepositoryError;
use jobflow_types::job::{Job, JobId, JobStatus};
use jobflow_types::tool::{Tool, ToolInvocationError, ToolOperation, ToolStatus};
use jobflow_types::workflow::{StepDefinition, StepOutputs, WorkflowDefinition};
use serde_json::{Value, json};

/// Tool client answering from a table keyed by action name.
///
/// Unknown actions return `null`. Every call is counted and recorded; clones
/// share the record so a test can keep a handle after moving the client.
#[derive(Clone, Default)]
pub struct ScriptedToolClient {
    replies: HashMap<String, Result<Value, ToolInvocationError>>,
    delay: Option<Duration>,
    calls: Arc<AtomicU32>,
    log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedToolClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, action: &str, value: Value) -> Self {
        self.replies.insert(action.to_string(), Ok(value));
        self
    }

    pub fn fail(mut self, action: &str, message: &str) -> Self {
        self.replies.insert(
            action.to_string(),
            Err(ToolInvocationError {
                code: 500,
                message: message.to_string(),
                data: None,
            }),
        );
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Actions invoked, in call order.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl ToolClient for ScriptedToolClient {
    async fn call_tool(
        &self,
        _tool: &Tool,
        name: &str,
        _arguments: &Value,
    ) -> Result<Value, ToolInvocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(name.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies.get(name).cloned().unwrap_or(Ok(Value::Null))
    }

    async fn list_tools(&self, _tool: &Tool) -> Result<Vec<ToolOperation>, ToolInvocationError> {
        Ok(vec![])
    }
}

/// In-memory job repository whose next `record_success` calls fail with a
/// query error. Clones share the store and the failure budget.
#[derive(Clone, Default)]
pub struct FlakyJobRepository {
    inner: InMemoryJobRepository,
    success_failures: Arc<AtomicU32>,
}

impl FlakyJobRepository {
    pub fn new(inner: InMemoryJobRepository) -> Self {
        Self {
            inner,
            success_failures: Arc::default(),
        }
    }

    /// Fail the next `n` success writes.
    pub fn fail_success_writes(&self, n: u32) {
        self.success_failures.store(n, Ordering::SeqCst);
    }
}

impl JobRepository for FlakyJobRepository {
    async fn insert(&self, job: &Job) -> Result<(), RepositoryError> {
        self.inner.insert(job).await
    }

    async fn find_by_id(&self, job_id: &JobId) -> Result<Option<Job>, RepositoryError> {
        self.inner.find_by_id(job_id).await
    }

    async fn find_by_user(&self, user_id: &str, limit: u32) -> Result<Vec<Job>, RepositoryError> {
        self.inner.find_by_user(user_id, limit).await
    }

    async fn find_claimable(&self, limit: u32) -> Result<Vec<Job>, RepositoryError> {
        self.inner.find_claimable(limit).await
    }

    async fn update_status(&self, job_id: &JobId, status: JobStatus) -> Result<(), RepositoryError> {
        self.inner.update_status(job_id, status).await
    }

    async fn claim(&self, job_id: &JobId) -> Result<bool, RepositoryError> {
        self.inner.claim(job_id).await
    }

    async fn record_success(
        &self,
        job_id: &JobId,
        output: &StepOutputs,
    ) -> Result<bool, RepositoryError> {
        let remaining = self.success_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.success_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RepositoryError::Query("database is locked".to_string()));
        }
        self.inner.record_success(job_id, output).await
    }

    async fn record_failure(&self, job_id: &JobId, error: &str) -> Result<bool, RepositoryError> {
        self.inner.record_failure(job_id, error).await
    }

    async fn record_retry(
        &self,
        job_id: &JobId,
        error: &str,
        max_retries: u32,
    ) -> Result<Option<u32>, RepositoryError> {
        self.inner.record_retry(job_id, error, max_retries).await
    }
}

pub type TestProcessor = JobProcessor<InMemoryJobRepository, InMemoryToolRegistry, ScriptedToolClient>;

/// Registry with each `(id, status)` registered.
pub fn registry(tools: &[(&str, ToolStatus)]) -> InMemoryToolRegistry {
    InMemoryToolRegistry::with_tools(tools.iter().map(|(id, status)| {
        Tool::new(*id, *id, format!("http://tools.test/{id}")).with_status(*status)
    }))
}

/// Processor over an in-memory store sharing `repo`.
pub fn processor(
    repo: InMemoryJobRepository,
    tools: InMemoryToolRegistry,
    client: ScriptedToolClient,
    bus: EventBus,
) -> TestProcessor {
    processor_over(repo, tools, client, bus)
}

/// Processor over any job repository.
pub fn processor_over<R: JobRepository>(
    repo: R,
    tools: InMemoryToolRegistry,
    client: ScriptedToolClient,
    bus: EventBus,
) -> JobProcessor<R, InMemoryToolRegistry, ScriptedToolClient> {
    JobProcessor::new(
        JobStore::new(repo),
        WorkflowExecutor::new(tools, client, bus.clone()),
        RetryPolicy::default(),
        bus,
    )
}

/// The two-step workflow used throughout the examples.
pub fn example_workflow() -> WorkflowDefinition {
    WorkflowDefinition::new(vec![
        StepDefinition::new("a", "t1", "foo"),
        StepDefinition::new("b", "t2", "bar").depends_on("a"),
    ])
}

pub fn example_client() -> ScriptedToolClient {
    ScriptedToolClient::new()
        .reply("foo", json!({"x": 1}))
        .reply("bar", json!({"y": 2}))
}
