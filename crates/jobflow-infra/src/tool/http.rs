//! JSON-RPC tool client over HTTP.
//!
//! Each call is a single `POST` of a `ToolRpcRequest` to the tool's
//! registered endpoint. Transport failures (connect, timeout, non-2xx) and
//! unparseable bodies are folded into `ToolInvocationError` so the executor
//! sees one error type for every way a call can fail.

use std::time::Duration;

use jobflow_core::tool::ToolClient;
use jobflow_types::config::ToolClientConfig;
use jobflow_types::tool::{
    Tool, ToolInvocationError, ToolOperation, ToolRpcRequest, ToolRpcResponse,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

/// `ToolClient` that speaks to tool endpoints with reqwest.
#[derive(Debug, Clone)]
pub struct HttpToolClient {
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ToolListResult {
    #[serde(default)]
    tools: Vec<ToolOperation>,
}

impl HttpToolClient {
    pub fn new(config: &ToolClientConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self { client })
    }

    async fn post(&self, tool: &Tool, request: &ToolRpcRequest) -> Result<Value, ToolInvocationError> {
        let response = self
            .client
            .post(&tool.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                ToolInvocationError::transport(format!(
                    "HTTP request to '{}' failed: {e}",
                    tool.endpoint
                ))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ToolInvocationError::transport(format!("failed to read tool response body: {e}"))
        })?;

        tracing::debug!(
            tool_id = %tool.id,
            method = %request.method,
            status = status.as_u16(),
            body_len = body.len(),
            "tool responded"
        );

        if !status.is_success() {
            // Tools may report a structured error with a non-2xx status.
            if let Ok(ToolRpcResponse { error: Some(err), .. }) =
                serde_json::from_str::<ToolRpcResponse>(&body)
            {
                return Err(err);
            }
            return Err(ToolInvocationError::transport(format!("HTTP {status}: {body}")));
        }

        serde_json::from_str::<ToolRpcResponse>(&body)
            .map_err(|e| ToolInvocationError::parse(format!("invalid tool response: {e}")))?
            .into_result()
    }
}

impl ToolClient for HttpToolClient {
    async fn call_tool(
        &self,
        tool: &Tool,
        name: &str,
        arguments: &Value,
    ) -> Result<Value, ToolInvocationError> {
        let request = ToolRpcRequest::call(Uuid::now_v7().to_string(), name, arguments);
        self.post(tool, &request).await
    }

    async fn list_tools(&self, tool: &Tool) -> Result<Vec<ToolOperation>, ToolInvocationError> {
        let request = ToolRpcRequest::list(Uuid::now_v7().to_string());
        let result = self.post(tool, &request).await?;
        let listed: ToolListResult = serde_json::from_value(result)
            .map_err(|e| ToolInvocationError::parse(format!("invalid tools/list result: {e}")))?;
        Ok(listed.tools)
    }
}
