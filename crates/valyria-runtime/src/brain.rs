use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};
use valyria_config::ValyriaConfig;
use valyria_config::schema::AgentConfig;
use valyria_core::{Message, Mode, Result, Role, ToolExecutor, ToolResult};
use valyria_llm::{AnthropicProvider, LlmProvider, LlmRequest, StopReason, Usage};
use valyria_store::{ConversationTurn, Playbooks};

use crate::offline::offline_reply;
use crate::prompt::{detect_text_speak, system_prompt};
use crate::tools::WorkspaceTools;

/// Everything the brain needs to answer one message.
#[derive(Debug, Clone, Copy)]
pub struct ThinkInput<'a> {
    pub message: &'a str,
    pub mode: Mode,
    pub playbooks: &'a Playbooks,
    /// Past turns, oldest first.
    pub history: &'a [ConversationTurn],
}

/// Which brain produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrainSource {
    Online,
    /// No provider is configured.
    Offline,
    /// The provider failed and the offline brain stood in.
    Fallback,
}

#[derive(Debug, Clone)]
pub struct Thought {
    pub text: String,
    pub source: BrainSource,
    pub usage: Usage,
    pub tool_calls: usize,
}

/// The online brain with its tools, and the offline brain behind it.
pub struct Brain {
    agent: AgentConfig,
    provider: Option<Arc<dyn LlmProvider>>,
    tools: Option<Arc<dyn ToolExecutor>>,
}

impl Brain {
    pub fn new(
        agent: AgentConfig,
        provider: Option<Arc<dyn LlmProvider>>,
        tools: Option<Arc<dyn ToolExecutor>>,
    ) -> Self {
        Self {
            agent,
            provider,
            tools,
        }
    }

    /// Wire up the Anthropic provider and workspace tools from config.
    /// Without an API key the brain runs offline only.
    pub fn from_config(config: &ValyriaConfig) -> Result<Self> {
        let provider: Option<Arc<dyn LlmProvider>> = if config.online_brain_available() {
            let key = config.services.anthropic_api_key.clone().unwrap_or_default();
            let mut anthropic = AnthropicProvider::new(key);
            if let Some(url) = &config.services.anthropic_base_url {
                anthropic = anthropic.with_base_url(url.clone());
            }
            info!(model = %config.agent.model, "online brain enabled");
            Some(Arc::new(anthropic))
        } else {
            warn!("online brain unavailable, answering with the offline brain");
            None
        };

        let tools: Option<Arc<dyn ToolExecutor>> = if config.tools.enabled {
            let tools = WorkspaceTools::new(config.tools.clone())?;
            info!(root = %tools.root().display(), "workspace tools enabled");
            Some(Arc::new(tools))
        } else {
            None
        };

        Ok(Self::new(config.agent.clone(), provider, tools))
    }

    pub fn is_online(&self) -> bool {
        self.provider.is_some()
    }

    pub fn tools_enabled(&self) -> bool {
        self.tools.is_some()
    }

    /// Answer a message. Never fails: provider errors degrade to the
    /// offline brain with a visible prefix.
    pub async fn think(&self, input: ThinkInput<'_>) -> Thought {
        let Some(provider) = &self.provider else {
            return Thought {
                text: offline_reply(input.message, input.mode, input.playbooks),
                source: BrainSource::Offline,
                usage: Usage::default(),
                tool_calls: 0,
            };
        };

        match self.think_online(provider.as_ref(), &input).await {
            Ok(thought) => thought,
            Err(e) => {
                warn!(error = %e, provider = provider.name(), "online brain failed, falling back");
                let prefix = if input.mode.is_emergency() {
                    "[OFFLINE - EMERGENCY] "
                } else {
                    "[Offline mode] "
                };
                Thought {
                    text: format!(
                        "{prefix}{}",
                        offline_reply(input.message, input.mode, input.playbooks)
                    ),
                    source: BrainSource::Fallback,
                    usage: Usage::default(),
                    tool_calls: 0,
                }
            }
        }
    }

    async fn think_online(
        &self,
        provider: &dyn LlmProvider,
        input: &ThinkInput<'_>,
    ) -> Result<Thought> {
        let emergency = input.mode.is_emergency();
        let history_limit = if emergency {
            self.agent.emergency_history_limit
        } else {
            self.agent.history_limit
        };

        let recent = &input.history[input.history.len().saturating_sub(history_limit)..];
        let mut messages = Vec::with_capacity(recent.len() * 2 + 1);
        for turn in recent {
            messages.push(Message::text(Role::User, &turn.user));
            messages.push(Message::text(Role::Assistant, &turn.assistant));
        }
        messages.push(Message::text(Role::User, input.message));

        let text_speak = detect_text_speak(input.history, input.message);
        let mut request = LlmRequest {
            model: self.agent.model.clone(),
            system: Some(system_prompt(
                input.mode,
                input.playbooks,
                input.message,
                text_speak,
                self.tools.is_some(),
            )),
            messages,
            tools: self.tools.as_ref().map(|t| t.tools()).unwrap_or_default(),
            max_tokens: if emergency {
                self.agent.emergency_max_tokens
            } else {
                self.agent.max_tokens
            },
            temperature: self.agent.temperature,
        };

        let mut usage = Usage::default();
        let mut tool_calls = 0;
        let mut rounds = 0;

        loop {
            let response = provider.complete(&request).await?;
            usage.merge(&response.usage);

            let wants_tools =
                response.stop_reason == StopReason::ToolUse && response.has_tool_calls();
            let Some(tools) = self.tools.as_ref().filter(|_| wants_tools) else {
                return Ok(Thought {
                    text: response.message.text_content(),
                    source: BrainSource::Online,
                    usage,
                    tool_calls,
                });
            };

            if rounds >= self.agent.max_tool_rounds {
                warn!(rounds, "tool round limit reached");
                let text = response.message.text_content();
                return Ok(Thought {
                    text: if text.trim().is_empty() {
                        format!("I stopped after {rounds} tool steps without finishing.")
                    } else {
                        text
                    },
                    source: BrainSource::Online,
                    usage,
                    tool_calls,
                });
            }
            rounds += 1;

            let mut results = Vec::with_capacity(response.message.tool_calls.len());
            for call in &response.message.tool_calls {
                info!(tool = %call.tool_name, round = rounds, "brain calling tool");
                let result = match tools.execute(call).await {
                    Ok(result) => result,
                    Err(e) => {
                        debug!(tool = %call.tool_name, error = %e, "tool call failed");
                        ToolResult::error(
                            call.id.clone(),
                            json!({
                                "success": false,
                                "error": format!("Tool execution failed: {e}"),
                            })
                            .to_string(),
                        )
                    }
                };
                results.push(result);
                tool_calls += 1;
            }

            request.messages.push(response.message);
            request.messages.push(Message::tool_results(&results));
        }
    }
}
