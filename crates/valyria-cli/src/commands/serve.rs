use std::sync::Arc;
use tracing::{info, warn};

use valyria_config::ConfigLoader;
use valyria_core::{Result, ValyriaError};
use valyria_runtime::Brain;
use valyria_server::AppState;

pub(super) async fn cmd_serve(config_loader: ConfigLoader, listen: Option<String>) -> Result<()> {
    if let Some(listen) = listen {
        config_loader.shared().write().server.listen = listen;
    }
    let config = config_loader.get();

    match config.validate() {
        Ok(warnings) => {
            for w in &warnings {
                warn!(field = %w.field, "{w}");
            }
        }
        Err(e) => return Err(ValyriaError::Config(e)),
    }

    println!("Valyria v{}", env!("CARGO_PKG_VERSION"));
    println!("   Listen: {}", config.server.listen);
    println!(
        "   Brain: {}",
        if config.online_brain_available() {
            config.agent.model.as_str()
        } else {
            "offline"
        }
    );
    println!();

    // Kept alive for the lifetime of the server
    let _watcher = match config_loader.watch() {
        Ok(w) => {
            info!(path = %config_loader.path().display(), "config hot-reload enabled");
            Some(w)
        }
        Err(e) => {
            warn!(error = %e, "config hot-reload disabled");
            None
        }
    };

    let store = valyria_store::open_store(&config.database).await?;
    info!(backend = store.backend(), "database ready");

    let brain = Brain::from_config(&config)?;
    let state = Arc::new(AppState::new(config_loader.shared(), store, brain));

    valyria_server::serve(state, &config.server.listen).await
}
