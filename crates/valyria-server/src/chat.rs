//! `POST /chat`: policy gate, brain, persistence, then a word-by-word
//! plain-text stream.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    body::{Body, Bytes},
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{debug, info, warn};
use valyria_core::{DecisionType, ToolKind, ValyriaError};
use valyria_policy::decide;
use valyria_runtime::{BrainSource, ThinkInput};
use valyria_store::NewDecision;

use crate::{ApiError, AppState, Caller};

/// Policy intents are truncated to this many characters.
const INTENT_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub uncertain: bool,
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;
    let config = state.config();
    let mode = state.mode.get();

    let intent: String = req.message.chars().take(INTENT_CHARS).collect();
    let decision = decide(mode, ToolKind::Chat, &intent, req.uncertain);
    state
        .store
        .log_decision(NewDecision {
            user_id: user.clone(),
            mode: mode.to_string(),
            tool: ToolKind::Chat.to_string(),
            intent,
            decision: decision.decision.to_string(),
            reason: decision.reason.clone(),
            uncertain: req.uncertain,
        })
        .await?;
    state.metrics.inc_policy_decisions();

    if decision.decision == DecisionType::Block {
        warn!(user = %user, reason = %decision.reason, "chat blocked by policy");
        let detail = serde_json::to_value(&decision).map_err(ValyriaError::from)?;
        return Err(ApiError::with_detail(StatusCode::FORBIDDEN, detail));
    }

    let playbooks = state.store.playbooks().await?;
    let history_limit = if mode.is_emergency() {
        config.agent.emergency_history_limit
    } else {
        config.agent.history_limit
    };
    let history = state
        .store
        .conversation_history(&user, history_limit)
        .await?;

    let thought = state
        .brain
        .think(ThinkInput {
            message: &req.message,
            mode,
            playbooks: &playbooks,
            history: &history,
        })
        .await;

    state.metrics.inc_chat_messages();
    if thought.source != BrainSource::Online {
        state.metrics.inc_offline_answers();
    }
    state
        .metrics
        .add_llm_tokens(thought.usage.input_tokens, thought.usage.output_tokens);
    state.metrics.add_tool_calls(thought.tool_calls);

    state
        .store
        .save_conversation(&user, &req.message, &thought.text, mode.as_str())
        .await?;
    info!(
        user = %user,
        %mode,
        source = ?thought.source,
        tool_calls = thought.tool_calls,
        "chat answered"
    );

    Ok(stream_words(thought.text, config.agent.stream_delay_ms))
}

/// Stream `text` one word at a time, each followed by a space, ending with a
/// newline.
fn stream_words(text: String, delay_ms: u64) -> Response {
    let delay = Duration::from_millis(delay_ms);
    let stream = async_stream::stream! {
        for word in text.split_whitespace() {
            yield Ok::<_, Infallible>(Bytes::from(format!("{word} ")));
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        yield Ok(Bytes::from_static(b"\n"));
        debug!("chat stream finished");
    };

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
        .into_response()
}
