//! # valyria-config
//!
//! Configuration system for the Valyria service. Reads from `valyria.toml`,
//! then applies environment variable overrides (`ANTHROPIC_API_KEY`,
//! `DATABASE_URL`, `PORT`, ...) and CLI overrides.
//!
//! Supports hot-reload via filesystem watcher.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::ValyriaConfig;
pub use schema::{ConfigWarning, DatabaseConfig, ServerConfig, WarningSeverity};
