//! Tool registry trait definition.
//!
//! The registry is read by the workflow executor to resolve a step's
//! `tool_id` into an endpoint, and written by the CLI when operators
//! register, approve, or disable tools.

use jobflow_types::error::RepositoryError;
use jobflow_types::tool::{Tool, ToolStatus};

/// Repository trait for registered tools.
pub trait ToolRegistry: Send + Sync {
    /// Insert or replace a tool by ID.
    fn register(
        &self,
        tool: &Tool,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a tool by its ID.
    fn find_by_id(
        &self,
        tool_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Tool>, RepositoryError>> + Send;

    /// List all tools ordered by ID.
    fn list(&self) -> impl std::future::Future<Output = Result<Vec<Tool>, RepositoryError>> + Send;

    /// Change a tool's status. Returns `RepositoryError::NotFound` for unknown IDs.
    fn set_status(
        &self,
        tool_id: &str,
        status: ToolStatus,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
