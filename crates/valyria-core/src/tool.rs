use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Description of a tool the online brain may call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Unique name, e.g. "read_file", "run_command".
    pub name: String,
    /// Human-readable description for the LLM.
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: Value,
    /// Whether this tool has side-effects (write vs read).
    #[serde(default)]
    pub is_mutating: bool,
    /// Risk level 0-10.
    #[serde(default)]
    pub risk_level: u8,
}

/// A request from the LLM to call a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// The result of executing a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
    /// Optional structured data returned alongside the text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn ok(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: false,
            data: None,
        }
    }

    pub fn error(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: true,
            data: None,
        }
    }
}

/// Trait implemented by anything that can execute tool calls.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// List all tools this executor provides.
    fn tools(&self) -> Vec<Tool>;

    /// Execute a single tool call and return the result.
    async fn execute(&self, call: &ToolCall) -> crate::Result<ToolResult>;
}
