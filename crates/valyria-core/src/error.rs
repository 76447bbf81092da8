use thiserror::Error;

/// Unified error type for the whole Valyria service.
#[derive(Error, Debug)]
pub enum ValyriaError {
    // ── LLM errors ─────────────────────────────────────────────
    #[error("llm provider error: {0}")]
    LlmProvider(String),

    #[error("llm rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    // ── Tool errors ────────────────────────────────────────────
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool execution failed: {tool}: {reason}")]
    ToolExecution { tool: String, reason: String },

    #[error("tool denied: {tool}: {reason}")]
    ToolDenied { tool: String, reason: String },

    // ── Storage errors ─────────────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    // ── Request errors ─────────────────────────────────────────
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("blocked by policy: {0}")]
    PolicyBlocked(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ValyriaError {
    /// Shorthand used by storage backends to wrap driver errors.
    pub fn storage(e: impl std::fmt::Display) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ValyriaError>;
