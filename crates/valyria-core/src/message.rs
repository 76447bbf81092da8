use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool::{ToolCall, ToolResult};

/// A message in a conversation sent to or received from the online brain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<MessageContent>,
    /// Tool calls requested by the assistant in this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub timestamp: DateTime<Utc>,
}

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// A single content block within a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
        is_error: bool,
    },
}

impl Message {
    /// Create a simple text message.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![MessageContent::Text { text: text.into() }],
            tool_calls: vec![],
            timestamp: Utc::now(),
        }
    }

    /// Bundle the results of one tool round into a single tool message.
    pub fn tool_results(results: &[ToolResult]) -> Self {
        Self {
            role: Role::Tool,
            content: results
                .iter()
                .map(|r| MessageContent::ToolResult {
                    tool_call_id: r.tool_call_id.clone(),
                    content: r.content.clone(),
                    is_error: r.is_error,
                })
                .collect(),
            tool_calls: vec![],
            timestamp: Utc::now(),
        }
    }

    /// Extract all text content joined together.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                MessageContent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
