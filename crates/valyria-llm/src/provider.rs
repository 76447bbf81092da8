use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use valyria_core::{Message, Result, Tool};

/// A request to an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// The model to use, e.g. "claude-sonnet-4-20250514".
    pub model: String,
    /// System prompt, sent separately from the conversation.
    pub system: Option<String>,
    /// Conversation so far, ending with the newest user or tool message.
    pub messages: Vec<Message>,
    /// Tools the model may call.
    pub tools: Vec<Tool>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A complete response from an LLM.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub message: Message,
    pub usage: Usage,
    pub stop_reason: StopReason,
}

impl LlmResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.message.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

impl StopReason {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("tool_use") => Self::ToolUse,
            Some("max_tokens") => Self::MaxTokens,
            Some("stop_sequence") => Self::StopSequence,
            _ => Self::EndTurn,
        }
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn merge(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Trait implemented by each LLM backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable name, e.g. "anthropic".
    fn name(&self) -> &str;

    /// Send a request and wait for the whole answer.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;

    /// Check whether the provider is usable.
    async fn health_check(&self) -> Result<()>;
}
