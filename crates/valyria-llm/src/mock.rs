//! Mock LLM provider for deterministic testing.
//!
//! Returns pre-configured responses without making any HTTP calls.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::provider::*;
use valyria_core::{Message, MessageContent, Result, Role, ToolCall, ValyriaError};

/// A mock LLM provider that returns pre-configured responses in order.
///
/// # Example
/// ```
/// use valyria_llm::MockProvider;
/// let provider = MockProvider::new("test").with_response("Hello, world!");
/// ```
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    /// Every request received, for assertions in tests.
    pub requests: Arc<Mutex<Vec<LlmRequest>>>,
    name: String,
}

/// A pre-configured response from the mock provider.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: StopReason,
    pub usage: Usage,
    /// If set, the provider returns this error instead.
    pub error: Option<String>,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            text: String::new(),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: Usage {
                input_tokens: 100,
                output_tokens: 50,
            },
            error: None,
        }
    }
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn error(msg: &str) -> Self {
        Self {
            error: Some(msg.to_string()),
            ..Default::default()
        }
    }
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(vec![])),
            name: name.into(),
        }
    }

    /// Queue a simple text response.
    pub fn with_response(self, text: &str) -> Self {
        self.with_mock_response(MockResponse::text(text))
    }

    /// Queue a tool call response.
    pub fn with_tool_call(self, name: &str, args: serde_json::Value) -> Self {
        self.with_mock_response(MockResponse {
            tool_calls: vec![ToolCall {
                id: format!("toolu_{}", uuid::Uuid::new_v4().simple()),
                tool_name: name.to_string(),
                arguments: args,
            }],
            stop_reason: StopReason::ToolUse,
            ..Default::default()
        })
    }

    /// Queue an error response.
    pub fn with_error(self, error: &str) -> Self {
        self.with_mock_response(MockResponse::error(error))
    }

    /// Queue a fully custom response.
    pub fn with_mock_response(self, resp: MockResponse) -> Self {
        self.responses.lock().push_back(resp);
        self
    }

    /// Shared handle on the recorded requests.
    pub fn recorded_requests(&self) -> Arc<Mutex<Vec<LlmRequest>>> {
        Arc::clone(&self.requests)
    }

    /// Number of queued responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }

    fn next_response(&self) -> MockResponse {
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| MockResponse::text("(mock: no more queued responses)"))
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.requests.lock().push(request.clone());
        let mock = self.next_response();

        if let Some(error) = mock.error {
            return Err(ValyriaError::LlmProvider(error));
        }

        let mut content = vec![];
        if !mock.text.is_empty() {
            content.push(MessageContent::Text { text: mock.text });
        }

        Ok(LlmResponse {
            message: Message {
                role: Role::Assistant,
                content,
                tool_calls: mock.tool_calls,
                timestamp: Utc::now(),
            },
            usage: mock.usage,
            stop_reason: mock.stop_reason,
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
