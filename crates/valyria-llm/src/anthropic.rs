use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use valyria_core::{Message, MessageContent, Result, Role, ToolCall, ValyriaError};

use crate::provider::*;

const API_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

/// Anthropic Claude API provider.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.into(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Translate a request into the Messages API wire format.
pub fn build_request_body(request: &LlmRequest) -> Value {
    let mut messages = Vec::new();
    for msg in &request.messages {
        match msg.role {
            Role::User => {
                messages.push(json!({
                    "role": "user",
                    "content": msg.text_content(),
                }));
            }
            Role::Assistant => {
                if msg.tool_calls.is_empty() {
                    messages.push(json!({
                        "role": "assistant",
                        "content": msg.text_content(),
                    }));
                } else {
                    // Assistant message with tool_use blocks
                    let mut blocks: Vec<Value> = Vec::new();
                    let text = msg.text_content();
                    if !text.is_empty() {
                        blocks.push(json!({ "type": "text", "text": text }));
                    }
                    for tc in &msg.tool_calls {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": tc.id,
                            "name": tc.tool_name,
                            "input": tc.arguments,
                        }));
                    }
                    messages.push(json!({ "role": "assistant", "content": blocks }));
                }
            }
            Role::Tool => {
                // Tool results travel as a user turn of tool_result blocks
                let blocks: Vec<Value> = msg
                    .content
                    .iter()
                    .filter_map(|block| match block {
                        MessageContent::ToolResult {
                            tool_call_id,
                            content,
                            is_error,
                        } => Some(json!({
                            "type": "tool_result",
                            "tool_use_id": tool_call_id,
                            "content": content,
                            "is_error": is_error,
                        })),
                        MessageContent::Text { .. } => None,
                    })
                    .collect();
                if blocks.is_empty() {
                    messages.push(json!({ "role": "user", "content": msg.text_content() }));
                } else {
                    messages.push(json!({ "role": "user", "content": blocks }));
                }
            }
        }
    }

    let mut body = json!({
        "model": &request.model,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "messages": messages,
    });

    if let Some(ref system) = request.system {
        body["system"] = json!(system);
    }

    if !request.tools.is_empty() {
        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                })
            })
            .collect();
        body["tools"] = json!(tools);
    }

    body
}

/// Parse a Messages API response body. Every text block becomes its own
/// content entry so callers can join them as they see fit.
pub fn parse_response(data: &Value) -> LlmResponse {
    let blocks = data["content"].as_array().cloned().unwrap_or_default();

    let content: Vec<MessageContent> = blocks
        .iter()
        .filter(|b| b["type"] == "text")
        .filter_map(|b| b["text"].as_str())
        .map(|text| MessageContent::Text {
            text: text.to_string(),
        })
        .collect();

    let tool_calls: Vec<ToolCall> = blocks
        .iter()
        .filter(|b| b["type"] == "tool_use")
        .map(|b| ToolCall {
            id: b["id"].as_str().unwrap_or_default().to_string(),
            tool_name: b["name"].as_str().unwrap_or_default().to_string(),
            arguments: b["input"].clone(),
        })
        .collect();

    let usage = &data["usage"];
    LlmResponse {
        message: Message {
            role: Role::Assistant,
            content,
            tool_calls,
            timestamp: Utc::now(),
        },
        usage: Usage {
            input_tokens: usage["input_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: usage["output_tokens"].as_u64().unwrap_or(0) as u32,
        },
        stop_reason: StopReason::parse(data["stop_reason"].as_str()),
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = build_request_body(request);
        debug!(model = %request.model, messages = request.messages.len(), "sending Anthropic API request");

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ValyriaError::LlmProvider(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            if status.as_u16() == 429 {
                let retry_after_secs = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                warn!(retry_after_secs, "Anthropic API rate limited");
                return Err(ValyriaError::RateLimited { retry_after_secs });
            }
            let text = resp.text().await.unwrap_or_default();
            return Err(ValyriaError::LlmProvider(format!("HTTP {status}: {text}")));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| ValyriaError::LlmProvider(e.to_string()))?;

        if data["type"] == "error" {
            let msg = data["error"]["message"].as_str().unwrap_or("unknown error");
            return Err(ValyriaError::LlmProvider(msg.to_string()));
        }

        let response = parse_response(&data);
        debug!(
            stop_reason = ?response.stop_reason,
            tool_calls = response.message.tool_calls.len(),
            tokens = response.usage.total_tokens(),
            "Anthropic API response"
        );
        Ok(response)
    }

    async fn health_check(&self) -> Result<()> {
        info!("checking Anthropic API health");
        if self.api_key.trim().is_empty() {
            return Err(ValyriaError::LlmProvider("ANTHROPIC_API_KEY not set".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use valyria_core::{Tool, ToolResult};

    fn request(messages: Vec<Message>) -> LlmRequest {
        LlmRequest {
            model: "claude-sonnet-4-20250514".into(),
            system: Some("You are Valyria.".into()),
            messages,
            tools: vec![Tool {
                name: "read_file".into(),
                description: "Read a file".into(),
                parameters: json!({"type": "object"}),
                is_mutating: false,
                risk_level: 1,
            }],
            max_tokens: 512,
            temperature: 0.7,
        }
    }

    #[test]
    fn body_carries_system_tools_and_limits() {
        let body = build_request_body(&request(vec![Message::text(Role::User, "hi")]));
        assert_eq!(body["system"], "You are Valyria.");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["tools"][0]["name"], "read_file");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        assert_eq!(body["messages"][0], json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn tool_round_trip_is_encoded_as_blocks() {
        let mut assistant = Message::text(Role::Assistant, "");
        assistant.content.clear();
        assistant.tool_calls = vec![ToolCall {
            id: "toolu_1".into(),
            tool_name: "list_files".into(),
            arguments: json!({"directory": "data"}),
        }];
        let results = Message::tool_results(&[ToolResult::ok("toolu_1", "{\"success\":true}")]);

        let body = build_request_body(&request(vec![
            Message::text(Role::User, "what's in data?"),
            assistant,
            results,
        ]));

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"][0]["type"], "tool_use");
        assert_eq!(messages[1]["content"][0]["input"]["directory"], "data");
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"][0]["type"], "tool_result");
        assert_eq!(messages[2]["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn parse_text_and_tool_use() {
        let data = json!({
            "content": [
                {"type": "text", "text": "Let me look."},
                {"type": "tool_use", "id": "toolu_9", "name": "read_file", "input": {"path": "a.txt"}},
                {"type": "text", "text": "One moment."}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 7}
        });
        let resp = parse_response(&data);
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert!(resp.has_tool_calls());
        assert_eq!(resp.message.tool_calls[0].tool_name, "read_file");
        assert_eq!(resp.message.text_content(), "Let me look.\nOne moment.");
        assert_eq!(resp.usage.total_tokens(), 19);
    }

    #[test]
    fn parse_tolerates_missing_fields() {
        let resp = parse_response(&json!({}));
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
        assert!(resp.message.content.is_empty());
        assert!(!resp.has_tool_calls());
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let p = AnthropicProvider::new("k".into()).with_base_url("http://localhost:9/v1/".into());
        assert_eq!(p.base_url(), "http://localhost:9/v1");
    }

    #[tokio::test]
    async fn health_check_requires_key() {
        assert!(AnthropicProvider::new("  ".into()).health_check().await.is_err());
        assert!(AnthropicProvider::new("sk-ant".into()).health_check().await.is_ok());
    }
}
