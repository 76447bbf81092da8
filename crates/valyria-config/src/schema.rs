use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration, mapped from `valyria.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValyriaConfig {
    pub agent: AgentConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub tools: ToolsConfig,
    pub bracelet: BraceletConfig,
    pub logging: LoggingConfig,
    pub services: ServicesConfig,
}

// ── Agent ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Anthropic model identifier used by the online brain.
    pub model: String,
    /// Maximum tokens per response in normal modes.
    pub max_tokens: u32,
    /// Maximum tokens per response while in EMERGENCY mode (short, direct answers).
    pub emergency_max_tokens: u32,
    /// Past conversation turns replayed to the model.
    pub history_limit: usize,
    /// Past turns replayed while in EMERGENCY mode.
    pub emergency_history_limit: usize,
    /// Upper bound on tool-use round trips for a single chat message.
    pub max_tool_rounds: u32,
    /// Temperature (0.0 - 2.0).
    pub temperature: f32,
    /// When false the online brain is never used, even with an API key.
    pub online: bool,
    /// Delay between words when streaming a chat answer.
    pub stream_delay_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".into(),
            max_tokens: 512,
            emergency_max_tokens: 256,
            history_limit: 10,
            emergency_history_limit: 3,
            max_tool_rounds: 8,
            temperature: 0.7,
            online: true,
            stream_delay_ms: 20,
        }
    }
}

// ── Server ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address.
    pub listen: String,
    /// Allow cross-origin requests from any origin (the web frontend runs elsewhere).
    pub cors: bool,
    /// Optional bearer token for the user-facing API.
    pub api_key: Option<String>,
    /// User id assumed when a request carries no `x-user-id` header.
    pub default_user: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".into(),
            cors: true,
            api_key: None,
            default_user: "local-dev-user".into(),
        }
    }
}

impl ServerConfig {
    /// Replace the port of `listen`, keeping the host part.
    pub fn with_port(&mut self, port: u16) {
        let host = match self.listen.rsplit_once(':') {
            Some((host, _)) => host.to_string(),
            None => self.listen.clone(),
        };
        self.listen = format!("{host}:{port}");
    }
}

// ── Database ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL. `postgres://` / `postgresql://` select PostgreSQL,
    /// `sqlite://` selects SQLite. Filled from `DATABASE_URL` when unset.
    pub url: Option<String>,
    /// SQLite file used when no URL is configured.
    pub path: PathBuf,
    /// Pool size for the PostgreSQL backend.
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            path: PathBuf::from("valyria.db"),
            max_connections: 5,
        }
    }
}

/// Where the store lives, resolved from [`DatabaseConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    Postgres(String),
    Sqlite(PathBuf),
}

impl DatabaseConfig {
    pub fn target(&self) -> Result<DatabaseTarget, String> {
        let Some(url) = self.url.as_deref().filter(|u| !u.trim().is_empty()) else {
            return Ok(DatabaseTarget::Sqlite(self.path.clone()));
        };
        let url = normalize_database_url(url.trim());
        if url.starts_with("postgresql://") {
            Ok(DatabaseTarget::Postgres(url))
        } else if url == "sqlite::memory:" {
            Ok(DatabaseTarget::Sqlite(PathBuf::from(":memory:")))
        } else if let Some(path) = url.strip_prefix("sqlite://") {
            Ok(DatabaseTarget::Sqlite(PathBuf::from(path)))
        } else {
            Err(format!("unsupported database url scheme in '{url}'"))
        }
    }
}

/// Managed PostgreSQL add-ons hand out `postgres://` URLs; normalise them.
pub fn normalize_database_url(url: &str) -> String {
    match url.strip_prefix("postgres://") {
        Some(rest) => format!("postgresql://{rest}"),
        None => url.to_string(),
    }
}

// ── Tools ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Offer workspace tools to the online brain.
    pub enabled: bool,
    /// Workspace root. Every tool path must resolve inside it.
    pub root: PathBuf,
    /// Directories (relative to root) where writes are permitted.
    pub write_dirs: Vec<String>,
    /// File extensions that may never be written.
    pub forbidden_extensions: Vec<String>,
    /// Substrings that make a command inadmissible.
    pub forbidden_commands: Vec<String>,
    /// A command must start with one of these.
    pub command_prefixes: Vec<String>,
    /// Default command timeout.
    pub default_timeout_secs: u64,
    /// Tool output is truncated to this many characters.
    pub max_output_chars: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: PathBuf::from("."),
            write_dirs: vec!["valyria_core".into(), "data".into()],
            forbidden_extensions: [".exe", ".dll", ".so", ".dylib", ".bat", ".sh", ".ps1"]
                .into_iter()
                .map(String::from)
                .collect(),
            forbidden_commands: ["rm ", "del ", "format", "shutdown", "reboot", "dd ", "mkfs", ">", ">>"]
                .into_iter()
                .map(String::from)
                .collect(),
            command_prefixes: ["python ", "py ", "pip ", "pytest ", "ls", "dir", "cat", "type"]
                .into_iter()
                .map(String::from)
                .collect(),
            default_timeout_secs: 30,
            max_output_chars: 20_000,
        }
    }
}

// ── Bracelet ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BraceletConfig {
    /// Switch the guardian into EMERGENCY mode when a reading raises alerts.
    pub auto_emergency_mode: bool,
    /// Stored readings returned by the history endpoint when no limit is given.
    pub history_limit: usize,
}

impl Default for BraceletConfig {
    fn default() -> Self {
        Self {
            auto_emergency_mode: true,
            history_limit: 50,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Services ───────────────────────────────────────────────────

/// External service credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Anthropic API key for the online brain.
    /// Can also be set via ANTHROPIC_API_KEY; the config file takes priority.
    pub anthropic_api_key: Option<String>,
    /// Override for the Anthropic API base URL (proxies, tests).
    pub anthropic_base_url: Option<String>,
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "[{}] {}: {}", tag, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, " ({h})")?;
        }
        Ok(())
    }
}

impl ValyriaConfig {
    /// Whether the online brain can be used at all.
    pub fn online_brain_available(&self) -> bool {
        self.agent.online
            && self
                .services
                .anthropic_api_key
                .as_deref()
                .is_some_and(|k| !k.trim().is_empty())
    }

    /// Validate the config and return a list of warnings.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Agent ───
        if self.agent.model.trim().is_empty() {
            warnings.push(ConfigWarning {
                field: "agent.model".into(),
                message: "model is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'claude-sonnet-4-20250514'".into()),
            });
        }
        if self.agent.max_tokens == 0 || self.agent.emergency_max_tokens == 0 {
            warnings.push(ConfigWarning {
                field: "agent.max_tokens".into(),
                message: "max_tokens is 0, the online brain won't produce output".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 512".into()),
            });
        }
        if self.agent.temperature < 0.0 || self.agent.temperature > 2.0 {
            warnings.push(ConfigWarning {
                field: "agent.temperature".into(),
                message: format!("temperature {} is out of range", self.agent.temperature),
                severity: WarningSeverity::Error,
                hint: Some("Temperature must be between 0.0 and 2.0".into()),
            });
        }
        if self.agent.max_tool_rounds == 0 && self.tools.enabled {
            warnings.push(ConfigWarning {
                field: "agent.max_tool_rounds".into(),
                message: "tools are enabled but no tool round is allowed".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set tools.enabled = false or raise max_tool_rounds".into()),
            });
        }
        if self.agent.online && !self.online_brain_available() {
            warnings.push(ConfigWarning {
                field: "services.anthropic_api_key".into(),
                message: "no Anthropic API key, answering with the offline brain only".into(),
                severity: WarningSeverity::Warning,
                hint: Some("export ANTHROPIC_API_KEY=sk-ant-...".into()),
            });
        }

        // ── Server ───
        if self.server.listen.trim().is_empty() {
            warnings.push(ConfigWarning {
                field: "server.listen".into(),
                message: "listen address is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. '0.0.0.0:8000'".into()),
            });
        } else if self.server.listen.starts_with("0.0.0.0") && self.server.api_key.is_none() {
            warnings.push(ConfigWarning {
                field: "server.api_key".into(),
                message: "no API key set while server is network-accessible".into(),
                severity: WarningSeverity::Info,
                hint: Some("Set server.api_key to protect profile and chat routes".into()),
            });
        }

        // ── Database ───
        if let Err(e) = self.database.target() {
            warnings.push(ConfigWarning {
                field: "database.url".into(),
                message: e,
                severity: WarningSeverity::Error,
                hint: Some("Use a postgresql:// or sqlite:// URL".into()),
            });
        }

        // ── Logging ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
