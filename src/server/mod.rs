//! HTTP server for the chat API.
//!
//! Provides REST endpoints for:
//! - Conversations and messages
//! - Feature flags
//! - Text generation
//!
//! Non-API paths are served from the static front-end directory.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::ServerState;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Start the HTTP server with graceful shutdown support.
///
/// The server will stop accepting new connections when `shutdown_signal` completes.
/// Replies still waiting in the reply worker are delivered before this returns.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn run_server_with_shutdown<F>(
    state: Arc<ServerState>,
    port: u16,
    shutdown_signal: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app: Router = create_router(Arc::clone(&state))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("gemchat server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("server error");

    state.replies.shutdown().await;
    tracing::info!("Reply worker drained");
    served
}
