//! `ToolClient` trait.

use std::future::Future;

use jobflow_types::tool::{Tool, ToolInvocationError, ToolOperation};
use serde_json::Value;

/// Invokes operations on a registered tool.
///
/// Implementations must surface remote `{code, message, data}` errors
/// unchanged and map transport failures to `ToolInvocationError::transport`.
pub trait ToolClient: Send + Sync {
    /// Call `name` on `tool` with `arguments`, returning the tool's `result`.
    fn call_tool(
        &self,
        tool: &Tool,
        name: &str,
        arguments: &Value,
    ) -> impl Future<Output = Result<Value, ToolInvocationError>> + Send;

    /// Ask `tool` which operations it offers.
    fn list_tools(
        &self,
        tool: &Tool,
    ) -> impl Future<Output = Result<Vec<ToolOperation>, ToolInvocationError>> + Send;
}
