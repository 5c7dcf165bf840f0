//! Startup helpers for the gemchat server.

use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;

use crate::config::ServerConfig;
use crate::conversations::StateStore;
use crate::server::{self, ServerState};

/// Run the server (used by the `gemchat-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    let dotenv = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting gemchat v{}", env!("CARGO_PKG_VERSION"));
    match dotenv {
        Ok(path) => tracing::info!("Loaded environment from {}", path.display()),
        Err(e) => tracing::debug!("No .env file loaded: {e}"),
    }

    let config = ServerConfig::from_env();
    if let Err(e) = config.validate() {
        tracing::error!("Invalid GEMINI_API_URL {}: {e}", config.gemini_url);
        return ExitCode::from(1);
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let result = rt.block_on(async {
        let state = initialize(&config).await?;
        run_server_with_shutdown(state, config.port, shutdown_signal()).await
    });

    if let Err(e) = result {
        tracing::error!("Server error: {e:#}");
        return ExitCode::from(1);
    }

    tracing::info!("gemchat stopped");
    ExitCode::SUCCESS
}

/// Seed the state file and build the shared server state.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
/// Returns an error if the generator client cannot be created.
pub async fn initialize(config: &ServerConfig) -> anyhow::Result<Arc<ServerState>> {
    tracing::info!("Gemini endpoint: {}", config.gemini_url);
    tracing::info!(
        "Gemini API key: {}",
        if config.api_configured() { "configured" } else { "not configured" }
    );

    let store = Arc::new(StateStore::new(config.data_file.clone()));
    tracing::info!("State file: {}", store.path().display());
    let initial = store.init_defaults().await;
    tracing::info!(
        conversations = initial.conversations.len(),
        gemini_enabled = initial.gemini_enabled,
        "State loaded"
    );

    ServerState::from_config(config, store).context("failed to create Gemini client")
}

/// Run server with graceful shutdown.
///
/// # Errors
/// Returns an error if the server fails.
pub async fn run_server_with_shutdown<F>(
    state: Arc<ServerState>,
    port: u16,
    shutdown_signal: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    server::run_server_with_shutdown(state, port, shutdown_signal).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::types::DEFAULT_CONVERSATION_ID;

    #[tokio::test]
    async fn test_initialize_seeds_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            data_file: dir.path().join("data").join("state.json"),
            ..ServerConfig::default()
        };

        let state = initialize(&config).await.unwrap();
        assert!(!state.generator.is_configured());
        assert!(config.data_file.exists());

        let conversations = state.conversations.list_conversations().await;
        assert!(conversations.contains_key(DEFAULT_CONVERSATION_ID));
    }
}
