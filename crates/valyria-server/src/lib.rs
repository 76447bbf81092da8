//! # valyria-server
//!
//! HTTP API for the Valyria guardian:
//!
//! - chat with the online/offline brain, streamed as plain text
//! - profiles, playbooks, proposals, memories and conversation history
//! - the mode switch and the policy gate with its decision log
//! - bracelet telemetry ingestion and device lookups
//! - `/status`, `/health` and Prometheus `/metrics`

pub mod bracelet;
pub mod chat;
pub mod error;
pub mod metrics;
pub mod routes;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use valyria_bracelet::DeviceRegistry;
use valyria_config::ValyriaConfig;
use valyria_core::{Result, ValyriaError};
use valyria_policy::ModeState;
use valyria_runtime::Brain;
use valyria_store::Store;

pub use error::ApiError;
pub use metrics::Metrics;

/// Shared server state.
pub struct AppState {
    /// Live config; hot reloads land here.
    pub config: Arc<RwLock<ValyriaConfig>>,
    pub store: Arc<dyn Store>,
    pub brain: Brain,
    pub mode: ModeState,
    pub devices: DeviceRegistry,
    pub metrics: Metrics,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Arc<RwLock<ValyriaConfig>>, store: Arc<dyn Store>, brain: Brain) -> Self {
        Self {
            config,
            store,
            brain,
            mode: ModeState::default(),
            devices: DeviceRegistry::new(),
            metrics: Metrics::new(),
            started_at: Instant::now(),
        }
    }

    /// Snapshot of the current config.
    pub fn config(&self) -> ValyriaConfig {
        self.config.read().clone()
    }
}

/// The user a request acts for: the `x-user-id` header, or the configured
/// default user.
#[derive(Debug, Clone)]
pub struct Caller(pub String);

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        Ok(Caller(match header {
            Some(id) => id.to_string(),
            None => state.config.read().server.default_user.clone(),
        }))
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_secs: u64,
}

/// Build the Axum router.
///
/// `/status`, `/health`, `/metrics` and `/bracelet/*` stay open so devices
/// and probes need no credentials; everything else requires the bearer key
/// when `server.api_key` is set.
pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/profile", get(routes::profile_get).put(routes::profile_put))
        .route("/profile/note", post(routes::profile_note))
        .route(
            "/proposals",
            get(routes::proposals_list).post(routes::proposals_add),
        )
        .route(
            "/playbooks",
            get(routes::playbooks_list).post(routes::playbooks_add),
        )
        .route("/mode", post(routes::set_mode))
        .route("/decide", post(routes::decide_handler))
        .route("/decisions", get(routes::decisions_list))
        .route("/policy", get(routes::policy_text))
        .route("/chat", post(chat::chat_handler))
        .route(
            "/conversations",
            get(routes::conversations_list).delete(routes::conversations_clear),
        )
        .route(
            "/memories",
            get(routes::memories_list).post(routes::memories_add),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let open = Router::new()
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/bracelet/data", post(bracelet::data_handler))
        .route("/bracelet/register", post(bracelet::register_handler))
        .route(
            "/bracelet/status/{device_id}",
            get(bracelet::status_handler),
        )
        .route(
            "/bracelet/history/{user_id}",
            get(bracelet::history_handler),
        );

    let cors = state.config.read().server.cors;
    let mut router = open
        .merge(protected)
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors {
        router = router.layer(CorsLayer::permissive());
    }

    router
}

/// Bind the listen address and serve until Ctrl-C.
pub async fn serve(state: Arc<AppState>, listen: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| ValyriaError::Config(format!("cannot bind {listen}: {e}")))?;
    info!(%listen, "valyria server listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;
    Ok(())
}

/// Check the Authorization header against the configured API key.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> std::result::Result<Response, ApiError> {
    let expected = state.config.read().server.api_key.clone();
    if let Some(expected) = expected {
        let provided = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if provided != Some(expected.as_str()) {
            warn!(path = %request.uri().path(), "unauthorized request");
            return Err(ApiError::unauthorized());
        }
    }
    Ok(next.run(request).await)
}

async fn track_requests(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    state.metrics.inc_http_requests();
    let response = next.run(request).await;
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        state.metrics.inc_http_errors();
    }
    response
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let database = match state.store.health().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "database health check failed");
            false
        }
    };
    Json(json!({
        "ok": true,
        "mode": state.mode.get(),
        "online_brain": state.brain.is_online(),
        "offline_brain": true,
        "tools_enabled": state.brain.tools_enabled(),
        "database": database,
        "database_backend": state.store.backend(),
    }))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.metrics.render_prometheus(state.started_at),
    )
}
