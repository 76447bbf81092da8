use clap::{Parser, Subcommand};
use std::path::PathBuf;

use valyria_config::{ConfigLoader, ValyriaConfig, WarningSeverity};
use valyria_core::{Result, ValyriaError};

mod serve;

/// Valyria: a protective AI guardian with wearable sensor monitoring
#[derive(Parser)]
#[command(name = "valyria", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to valyria.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Start the HTTP API server (default)
    Serve {
        /// Listen address, overriding server.listen
        #[arg(long)]
        listen: Option<String>,
    },
    /// Query the status of a running server
    Status {
        /// Base URL of the server (default: derived from server.listen)
        #[arg(long)]
        url: Option<String>,
    },
    /// Show the effective configuration, secrets redacted
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check configuration, database and tool workspace
    Doctor,
    /// Show version and build info
    Version,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        init_tracing(&config.logging.format, &self.log_level(&config));

        match self.command.unwrap_or(Commands::Serve { listen: None }) {
            Commands::Serve { listen } => serve::cmd_serve(config_loader, listen).await,
            Commands::Status { url } => Self::cmd_status(&config, url).await,
            Commands::Config { json } => Self::cmd_config(&config, json),
            Commands::Doctor => Self::cmd_doctor(&config).await,
            Commands::Version => Self::cmd_version(),
        }
    }

    /// `--verbose` > `--quiet` > `--log-level` > `logging.level`.
    fn log_level(&self, config: &ValyriaConfig) -> String {
        if self.verbose {
            "debug".into()
        } else if self.quiet {
            "error".into()
        } else {
            self.log_level
                .clone()
                .unwrap_or_else(|| config.logging.level.clone())
        }
    }

    async fn cmd_status(config: &ValyriaConfig, url: Option<String>) -> Result<()> {
        let base = url.unwrap_or_else(|| status_url(&config.server.listen));
        println!("Checking status at {base}...");

        match reqwest::Client::new()
            .get(format!("{}/status", base.trim_end_matches('/')))
            .send()
            .await
        {
            Ok(resp) => {
                let data: serde_json::Value = resp
                    .json()
                    .await
                    .map_err(|e| ValyriaError::Other(e.into()))?;
                println!("{}", serde_json::to_string_pretty(&data)?);
            }
            Err(_) => {
                println!("Valyria is not running at {base}");
            }
        }
        Ok(())
    }

    fn cmd_config(config: &ValyriaConfig, json: bool) -> Result<()> {
        let config = redacted(config);
        if json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(&config).map_err(|e| ValyriaError::Config(e.to_string()))?
            );
        }
        Ok(())
    }

    async fn cmd_doctor(config: &ValyriaConfig) -> Result<()> {
        println!("Valyria doctor\n");
        let mut problems = 0usize;

        match config.validate() {
            Ok(warnings) if warnings.is_empty() => println!("  ok   configuration"),
            Ok(warnings) => {
                for w in &warnings {
                    let tag = match w.severity {
                        WarningSeverity::Warning => "warn",
                        _ => "info",
                    };
                    println!("  {tag:<4} {w}");
                }
            }
            Err(messages) => {
                problems += 1;
                println!("  FAIL {messages}");
            }
        }

        match valyria_store::open_store(&config.database).await {
            Ok(store) => match store.health().await {
                Ok(()) => println!("  ok   database ({})", store.backend()),
                Err(e) => {
                    problems += 1;
                    println!("  FAIL database: {e}");
                }
            },
            Err(e) => {
                problems += 1;
                println!("  FAIL database: {e}");
            }
        }

        if config.tools.enabled {
            if config.tools.root.is_dir() {
                println!("  ok   tool workspace {}", config.tools.root.display());
            } else {
                problems += 1;
                println!(
                    "  FAIL tool workspace {} is not a directory",
                    config.tools.root.display()
                );
            }
        }

        if config.online_brain_available() {
            println!("  ok   online brain ({})", config.agent.model);
        } else {
            println!("  info online brain unavailable, offline brain only");
        }

        println!();
        if problems > 0 {
            return Err(ValyriaError::Config(format!(
                "doctor found {problems} problem(s)"
            )));
        }
        println!("  All checks passed");
        Ok(())
    }

    fn cmd_version() -> Result<()> {
        println!("Valyria v{}", env!("CARGO_PKG_VERSION"));
        println!("   Target: {}", std::env::consts::ARCH);
        println!("   OS: {}", std::env::consts::OS);
        #[cfg(debug_assertions)]
        println!("   Profile: debug");
        #[cfg(not(debug_assertions))]
        println!("   Profile: release");
        Ok(())
    }
}

fn init_tracing(format: &str, log_level: &str) {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level))
    };
    if format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .json()
            .with_target(true)
            .init();
    } else if format == "compact" {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .compact()
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_target(false)
            .init();
    }
}

/// Base URL for a local server listening on `listen`.
fn status_url(listen: &str) -> String {
    let local = match listen.rsplit_once(':') {
        Some(("0.0.0.0" | "[::]" | "", port)) => format!("127.0.0.1:{port}"),
        _ => listen.to_string(),
    };
    format!("http://{local}")
}

fn redacted(config: &ValyriaConfig) -> ValyriaConfig {
    let mut config = config.clone();
    let mask = |s: &mut Option<String>| {
        if s.is_some() {
            *s = Some("***".into());
        }
    };
    mask(&mut config.server.api_key);
    mask(&mut config.services.anthropic_api_key);
    if let Some(url) = config.database.url.as_mut() {
        // Hide the password part of user:password@host.
        if let Some((scheme, rest)) = url.split_once("://") {
            if let Some((creds, host)) = rest.split_once('@') {
                let user = creds.split(':').next().unwrap_or_default();
                *url = format!("{scheme}://{user}:***@{host}");
            }
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("valyria").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn no_subcommand_means_serve() {
        assert_eq!(parse(&[]).command, None);
        assert_eq!(
            parse(&["serve", "--listen", "127.0.0.1:9000"]).command,
            Some(Commands::Serve {
                listen: Some("127.0.0.1:9000".into())
            })
        );
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["valyria", "-v", "-q", "status"]).is_err());
    }

    #[test]
    fn log_level_precedence() {
        let config = ValyriaConfig::default();
        assert_eq!(parse(&[]).log_level(&config), "info");
        assert_eq!(parse(&["-l", "warn"]).log_level(&config), "warn");
        assert_eq!(parse(&["-l", "warn", "-q"]).log_level(&config), "error");
        assert_eq!(parse(&["-l", "warn", "-v"]).log_level(&config), "debug");
    }

    #[test]
    fn status_url_uses_loopback_for_wildcard() {
        assert_eq!(status_url("0.0.0.0:8000"), "http://127.0.0.1:8000");
        assert_eq!(status_url("10.0.0.5:8080"), "http://10.0.0.5:8080");
    }

    #[test]
    fn secrets_are_redacted() {
        let mut config = ValyriaConfig::default();
        config.server.api_key = Some("secret".into());
        config.services.anthropic_api_key = Some("sk-ant-123".into());
        config.database.url = Some("postgresql://valyria:hunter2@db:5432/valyria".into());

        let shown = redacted(&config);
        assert_eq!(shown.server.api_key.as_deref(), Some("***"));
        assert_eq!(shown.services.anthropic_api_key.as_deref(), Some("***"));
        assert_eq!(
            shown.database.url.as_deref(),
            Some("postgresql://valyria:***@db:5432/valyria")
        );
    }
}
