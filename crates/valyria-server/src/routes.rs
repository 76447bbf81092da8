//! Profile, policy and bookkeeping endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    http::header,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use valyria_core::Decision;
use valyria_policy::{POLICY_TEXT, decide, parse_mode, parse_tool};
use valyria_store::{
    ConversationTurn, DecisionRecord, MemoryRecord, NewDecision, NewProposal, NewRule,
    PlaybookRule, Playbooks, Profile, ProfilePatch, Proposal,
};

use crate::{ApiError, AppState, Caller};

type ApiResult<T> = Result<T, ApiError>;

fn default_limit() -> usize {
    50
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

// ── Profile ────────────────────────────────────────────────────

pub async fn profile_get(State(state): State<Arc<AppState>>, Caller(user): Caller) -> ApiResult<Json<Profile>> {
    Ok(Json(state.store.get_profile(&user).await?))
}

pub async fn profile_put(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    payload: Result<Json<ProfilePatch>, JsonRejection>,
) -> ApiResult<Json<Profile>> {
    let Json(patch) = payload?;
    let profile = state.store.update_profile(&user, patch).await?;
    info!(user = %user, "profile updated");
    Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
pub struct NoteIn {
    pub note: String,
}

pub async fn profile_note(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    payload: Result<Json<NoteIn>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = payload?;
    state.store.add_profile_note(&user, &body.note).await?;
    Ok(Json(json!({ "ok": true })))
}

// ── Proposals & playbooks ──────────────────────────────────────

pub async fn proposals_list(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Proposal>>> {
    Ok(Json(state.store.list_proposals().await?))
}

pub async fn proposals_add(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewProposal>, JsonRejection>,
) -> ApiResult<Json<Proposal>> {
    let Json(proposal) = payload?;
    if proposal.title.trim().is_empty() {
        return Err(ApiError::new(
            axum::http::StatusCode::UNPROCESSABLE_ENTITY,
            "title must not be empty",
        ));
    }
    Ok(Json(state.store.add_proposal(proposal).await?))
}

pub async fn playbooks_list(State(state): State<Arc<AppState>>) -> ApiResult<Json<Playbooks>> {
    Ok(Json(state.store.playbooks().await?))
}

pub async fn playbooks_add(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewRule>, JsonRejection>,
) -> ApiResult<Json<PlaybookRule>> {
    let Json(rule) = payload?;
    if rule.topic.trim().is_empty() || rule.rule.trim().is_empty() {
        return Err(ApiError::new(
            axum::http::StatusCode::UNPROCESSABLE_ENTITY,
            "topic and rule must not be empty",
        ));
    }
    let rule = state.store.add_playbook_rule(rule).await?;
    info!(topic = %rule.topic, priority = rule.priority, "playbook rule added");
    Ok(Json(rule))
}

// ── Mode & policy ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ModeIn {
    pub mode: String,
}

pub async fn set_mode(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ModeIn>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = payload?;
    let mode = parse_mode(Some(&body.mode));
    state.mode.set(mode);
    Ok(Json(json!({ "mode": mode })))
}

#[derive(Debug, Deserialize)]
pub struct DecideIn {
    pub tool: String,
    pub intent: String,
    #[serde(default)]
    pub uncertain: bool,
}

pub async fn decide_handler(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    payload: Result<Json<DecideIn>, JsonRejection>,
) -> ApiResult<Json<Decision>> {
    let Json(req) = payload?;
    let mode = state.mode.get();
    let tool = parse_tool(Some(&req.tool));
    let decision = decide(mode, tool, &req.intent, req.uncertain);

    state
        .store
        .log_decision(NewDecision {
            user_id: user,
            mode: mode.to_string(),
            tool: tool.to_string(),
            intent: req.intent,
            decision: decision.decision.to_string(),
            reason: decision.reason.clone(),
            uncertain: req.uncertain,
        })
        .await?;
    state.metrics.inc_policy_decisions();

    Ok(Json(decision))
}

pub async fn decisions_list(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Query(params): Query<LimitParams>,
) -> ApiResult<Json<Vec<DecisionRecord>>> {
    Ok(Json(state.store.decisions(&user, params.limit).await?))
}

pub async fn policy_text() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        POLICY_TEXT,
    )
}

// ── Conversations & memories ───────────────────────────────────

pub async fn conversations_list(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Query(params): Query<LimitParams>,
) -> ApiResult<Json<Vec<ConversationTurn>>> {
    Ok(Json(
        state.store.conversation_history(&user, params.limit).await?,
    ))
}

pub async fn conversations_clear(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
) -> ApiResult<Json<Value>> {
    let deleted = state.store.clear_conversation_history(&user).await?;
    info!(user = %user, deleted, "conversation history cleared");
    Ok(Json(json!({ "ok": true, "deleted": deleted })))
}

#[derive(Debug, Deserialize)]
pub struct MemoryQuery {
    #[serde(rename = "type")]
    pub memory_type: Option<String>,
}

pub async fn memories_list(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Query(query): Query<MemoryQuery>,
) -> ApiResult<Json<Vec<MemoryRecord>>> {
    Ok(Json(
        state
            .store
            .memories(&user, query.memory_type.as_deref())
            .await?,
    ))
}

fn general() -> String {
    "general".into()
}

#[derive(Debug, Deserialize)]
pub struct MemoryIn {
    pub content: String,
    #[serde(rename = "type", default = "general")]
    pub memory_type: String,
    #[serde(default)]
    pub context: Option<String>,
}

pub async fn memories_add(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    payload: Result<Json<MemoryIn>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(memory) = payload?;
    if memory.content.trim().is_empty() {
        return Err(ApiError::new(
            axum::http::StatusCode::UNPROCESSABLE_ENTITY,
            "content must not be empty",
        ));
    }
    let id = state
        .store
        .save_memory(
            &user,
            &memory.content,
            &memory.memory_type,
            memory.context.as_deref(),
        )
        .await?;
    Ok(Json(json!({ "ok": true, "id": id })))
}
