//! Application state wiring the store, registry, queue, and tool client.
//!
//! The core services are generic over repository/queue/client traits;
//! `AppState` pins them to the concrete infra implementations.

use std::path::PathBuf;

use jobflow_core::event::EventBus;
use jobflow_core::orchestrator::{JobProcessor, Orchestrator, RetryPolicy};
use jobflow_core::service::{AllowAllCredits, JobAdmission, JobStore};
use jobflow_core::workflow::WorkflowExecutor;
use jobflow_infra::config::{database_url, load_config, resolve_data_dir};
use jobflow_infra::queue::QueueTransport;
use jobflow_infra::sqlite::{DatabasePool, SqliteJobRepository, SqliteToolRegistry};
use jobflow_infra::tool::HttpToolClient;
use jobflow_types::config::JobflowConfig;

/// Concrete type aliases for the core generics pinned to infra implementations.
pub type ConcreteJobStore = JobStore<SqliteJobRepository>;

pub type ConcreteAdmission = JobAdmission<SqliteJobRepository, QueueTransport, AllowAllCredits>;

pub type ConcreteOrchestrator =
    Orchestrator<SqliteJobRepository, SqliteToolRegistry, HttpToolClient, QueueTransport>;

/// Shared application state used by every CLI command.
#[derive(Clone)]
pub struct AppState {
    pub config: JobflowConfig,
    pub data_dir: PathBuf,
    pub job_store: ConcreteJobStore,
    pub tools: SqliteToolRegistry,
    pub tool_client: HttpToolClient,
    pub queue: QueueTransport,
    pub event_bus: EventBus,
}

impl AppState {
    /// Initialize the application state: load config, connect to DB, wire services.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_config(&data_dir).await;
        let db_pool = DatabasePool::new(&database_url(&config, &data_dir)).await?;

        let job_store = JobStore::new(SqliteJobRepository::new(db_pool.clone()));
        let tools = SqliteToolRegistry::new(db_pool.clone());
        let tool_client = HttpToolClient::new(&config.tools)?;
        let queue = QueueTransport::from_config(&config.queue, &db_pool);

        tracing::debug!(
            data_dir = %data_dir.display(),
            queue = ?queue.backend(),
            "application state initialized"
        );

        Ok(Self {
            config,
            data_dir,
            job_store,
            tools,
            tool_client,
            queue,
            event_bus: EventBus::default(),
        })
    }

    /// Admission service publishing onto the configured queue.
    pub fn admission(&self) -> ConcreteAdmission {
        JobAdmission::new(self.job_store.clone(), self.queue.clone(), AllowAllCredits)
    }

    /// Orchestrator consuming from the configured queue.
    pub fn orchestrator(&self) -> ConcreteOrchestrator {
        let executor = WorkflowExecutor::new(
            self.tools.clone(),
            self.tool_client.clone(),
            self.event_bus.clone(),
        );
        let processor = JobProcessor::new(
            self.job_store.clone(),
            executor,
            RetryPolicy::from_config(&self.config.orchestrator),
            self.event_bus.clone(),
        );
        Orchestrator::new(processor, self.queue.clone(), self.config.orchestrator.clone())
    }
}
