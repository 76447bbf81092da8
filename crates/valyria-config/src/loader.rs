use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::schema::{ValyriaConfig, normalize_database_url};

/// Loads and optionally hot-reloads the Valyria configuration.
pub struct ConfigLoader {
    config: Arc<RwLock<ValyriaConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > VALYRIA_CONFIG env > ./valyria.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("VALYRIA_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from("valyria.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> valyria_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            Self::read_file(&config_path)?
        } else {
            info!(?config_path, "config file not found, using defaults");
            ValyriaConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(valyria_core::ValyriaError::Config(e));
            }
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    fn read_file(path: &Path) -> valyria_core::Result<ValyriaConfig> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str::<ValyriaConfig>(&raw).map_err(|e| {
            valyria_core::ValyriaError::Config(format!(
                "failed to parse {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> ValyriaConfig {
        self.config.read().clone()
    }

    /// Get a shared reference for subscription.
    pub fn shared(&self) -> Arc<RwLock<ValyriaConfig>> {
        Arc::clone(&self.config)
    }

    /// Path being watched.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply process environment overrides.
    pub fn apply_env_overrides(config: ValyriaConfig) -> ValyriaConfig {
        Self::apply_overrides_from(config, |key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    ///
    /// Credentials and the database URL only fill in what the file left
    /// empty; operational knobs (`PORT`, log level, model) always win.
    pub fn apply_overrides_from(
        mut config: ValyriaConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ValyriaConfig {
        if config.services.anthropic_api_key.is_none() {
            if let Some(v) = lookup("ANTHROPIC_API_KEY").filter(|v| !v.is_empty()) {
                config.services.anthropic_api_key = Some(v);
            }
        }
        if config.database.url.is_none() {
            if let Some(v) = lookup("DATABASE_URL").filter(|v| !v.is_empty()) {
                config.database.url = Some(v);
            }
        }
        if let Some(url) = config.database.url.take() {
            config.database.url = Some(normalize_database_url(&url));
        }
        if let Some(v) = lookup("PORT") {
            match v.parse::<u16>() {
                Ok(port) => config.server.with_port(port),
                Err(_) => warn!(value = %v, "ignoring non-numeric PORT"),
            }
        }
        if let Some(v) = lookup("VALYRIA_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Some(v) = lookup("VALYRIA_MODEL") {
            config.agent.model = v;
        }
        config
    }

    /// Reload the config from disk.
    pub fn reload(&self) -> valyria_core::Result<()> {
        if !self.config_path.exists() {
            return Err(valyria_core::ValyriaError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let new_config = Self::apply_env_overrides(Self::read_file(&self.config_path)?);
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }

    /// Start a background file watcher that reloads the config when the file changes.
    /// The returned watcher must be kept alive for watching to continue.
    pub fn watch(&self) -> valyria_core::Result<notify::RecommendedWatcher> {
        let config = Arc::clone(&self.config);
        let path_for_event = self.config_path.clone();

        info!(config_path = ?self.config_path, "starting config file watcher");

        let mut watcher =
            notify::recommended_watcher(move |res: Result<NotifyEvent, notify::Error>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    let is_our_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == path_for_event.file_name());
                    if !is_our_file {
                        return;
                    }
                    match Self::read_file(&path_for_event) {
                        Ok(new_config) => {
                            *config.write() = Self::apply_env_overrides(new_config);
                            info!("configuration hot-reloaded");
                        }
                        Err(e) => {
                            warn!(error = %e, "config file has errors, keeping current config");
                        }
                    }
                }
                Err(e) => warn!(error = %e, "file watcher error"),
            })
            .map_err(|e| {
                valyria_core::ValyriaError::Config(format!("failed to create file watcher: {e}"))
            })?;

        // Watch the parent directory (some editors create temp files + rename)
        let watch_path = match self.config_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .map_err(|e| {
                valyria_core::ValyriaError::Config(format!("failed to watch config directory: {e}"))
            })?;

        Ok(watcher)
    }
}
