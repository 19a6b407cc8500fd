//! Tool registry and tool RPC wire types.
//!
//! A `Tool` is an externally registered capability reachable over HTTP. Tools
//! speak a small JSON-RPC style contract:
//!
//! ```json
//! {"jsonrpc": "2.0", "method": "tools/call", "params": {"name": "...", "arguments": {}}, "id": "..."}
//! ```
//!
//! and answer with either `{"result": ...}` or `{"error": {"code", "message", "data"}}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fmt;
use std::str::FromStr;

/// JSON-RPC method used to invoke a tool operation.
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// JSON-RPC method used to enumerate a tool's operations.
pub const METHOD_TOOLS_LIST: &str = "tools/list";

/// Standard JSON-RPC code for a response body that could not be parsed.
pub const RPC_PARSE_ERROR: i64 = -32700;

/// Standard JSON-RPC code for an internal/transport failure.
pub const RPC_INTERNAL_ERROR: i64 = -32603;

// ---------------------------------------------------------------------------
// Registry types
// ---------------------------------------------------------------------------

/// A registered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Registry id referenced by `StepDefinition::tool_id`.
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// HTTP endpoint receiving JSON-RPC requests.
    pub endpoint: String,
    pub status: ToolStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tool {
    /// Build a newly registered tool awaiting approval.
    pub fn new(id: impl Into<String>, name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            endpoint: endpoint.into(),
            status: ToolStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the status (builder style).
    pub fn with_status(mut self, status: ToolStatus) -> Self {
        self.status = status;
        self
    }

    /// Whether workflow steps may invoke this tool.
    pub fn is_callable(&self) -> bool {
        self.status == ToolStatus::Approved
    }
}

/// Review state of a registered tool. Only `Approved` tools are callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Pending,
    Approved,
    Disabled,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Pending => "pending",
            ToolStatus::Approved => "approved",
            ToolStatus::Disabled => "disabled",
        }
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ToolStatus::Pending),
            "approved" => Ok(ToolStatus::Approved),
            "disabled" => Ok(ToolStatus::Disabled),
            other => Err(format!("invalid tool status: '{other}'")),
        }
    }
}

/// An operation advertised by a tool via `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOperation {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Wire envelope
// ---------------------------------------------------------------------------

/// Request envelope sent to a tool endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
    pub id: String,
}

impl ToolRpcRequest {
    /// Build a `tools/call` request for one operation.
    pub fn call(id: impl Into<String>, name: &str, arguments: &serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: METHOD_TOOLS_CALL.to_string(),
            params: serde_json::json!({ "name": name, "arguments": arguments }),
            id: id.into(),
        }
    }

    /// Build a `tools/list` request.
    pub fn list(id: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: METHOD_TOOLS_LIST.to_string(),
            params: serde_json::json!({}),
            id: id.into(),
        }
    }
}

/// Response envelope returned by a tool endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolRpcResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolInvocationError>,
}

impl ToolRpcResponse {
    /// Collapse the envelope into the call outcome.
    ///
    /// An `error` member wins over `result`. A response carrying neither
    /// yields `Value::Null`.
    pub fn into_result(self) -> Result<serde_json::Value, ToolInvocationError> {
        match (self.error, self.result) {
            (Some(err), _) => Err(err),
            (None, Some(result)) => Ok(result),
            (None, None) => Ok(serde_json::Value::Null),
        }
    }
}

/// Failure of a remote tool call, carrying the remote `{code, message, data}`.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("tool error {code}: {message}")]
pub struct ToolInvocationError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolInvocationError {
    /// A transport-level failure (connect, timeout, non-2xx).
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            code: RPC_INTERNAL_ERROR,
            message: message.into(),
            data: None,
        }
    }

    /// A response body that was not a valid envelope.
    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            code: RPC_PARSE_ERROR,
            message: message.into(),
            data: None,
        }
    }
}
