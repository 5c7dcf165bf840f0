//! HTTP route handlers for the chat API.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::handler::HandlerWithoutStateExt;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::ServeDir;
use tracing::warn;

use crate::conversations::{AppState, ChatError, Conversation, Message, MessageDraft};
use crate::llm::ContextMessage;

use super::error::{ApiError, not_found, panic_response};
use super::state::ServerState;

/// Create the router with all API routes and the static fallback.
pub fn create_router(state: Arc<ServerState>) -> Router {
    let static_files = ServeDir::new(&state.static_dir)
        .call_fallback_on_method_not_allowed(true)
        .not_found_service(not_found.into_service());

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/api/conversations/{id}",
            get(get_conversation).delete(delete_conversation),
        )
        .route(
            "/api/conversations/{id}/messages",
            get(list_messages).post(add_message).delete(clear_messages),
        )
        .route("/api/state", get(get_state))
        .route("/api/bot", post(toggle_bot))
        .route("/api/gemini/toggle", post(toggle_gemini))
        .route("/api/gemini/generate", post(generate))
        .route("/api/gemini/status", get(gemini_status))
        .fallback_service(static_files)
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "gemchat",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Body of `POST /api/conversations`.
#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    /// Display name; required and non-blank.
    pub name: Option<String>,
}

/// Body of `POST /api/gemini/generate`.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// Text to answer.
    pub prompt: Option<String>,
    /// Preceding messages, oldest first.
    #[serde(default)]
    pub context: Vec<ContextMessage>,
}

/// Confirmation for destructive operations.
#[derive(Debug, Serialize)]
pub struct Confirmation {
    /// What happened.
    pub message: String,
}

/// Response of `POST /api/bot`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotToggleResponse {
    /// New value of the flag.
    pub simulate_bot: bool,
}

/// Response of `POST /api/gemini/toggle`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiToggleResponse {
    /// New value of the flag.
    pub gemini_enabled: bool,
    /// Human-readable summary.
    pub message: String,
}

/// Response of `POST /api/gemini/generate`.
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    /// Generated text.
    pub response: String,
    /// Always `"success"`.
    pub status: &'static str,
}

/// Response of `GET /api/gemini/status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiStatusResponse {
    /// Whether automatic replies are on.
    pub gemini_enabled: bool,
    /// Whether an API key is configured.
    pub api_configured: bool,
}

async fn list_conversations(
    State(state): State<Arc<ServerState>>,
) -> Json<BTreeMap<String, Conversation>> {
    Json(state.conversations.list_conversations().await)
}

async fn get_conversation(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<Conversation>, ApiError> {
    Ok(Json(state.conversations.get_conversation(&id).await?))
}

async fn create_conversation(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<CreateConversationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let Json(request) = payload?;
    let name = request.name.unwrap_or_default();
    let conversation = state.conversations.create_conversation(&name).await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

async fn list_messages(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    Ok(Json(state.conversations.list_messages(&id).await?))
}

async fn add_message(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    payload: Result<Json<MessageDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    // An unknown conversation is reported before any problem with the body.
    state.conversations.ensure_conversation(&id).await?;
    let Json(draft) = payload?;
    let posted = state.conversations.add_message(&id, draft).await?;

    if let Some(job) = posted.reply {
        if !state.replies.schedule(job) {
            warn!(conversation = %id, "reply worker stopped, reply not scheduled");
        }
    }

    Ok((StatusCode::CREATED, Json(posted.message)))
}

async fn delete_conversation(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<Confirmation>, ApiError> {
    state.conversations.delete_conversation(&id).await?;
    Ok(Json(Confirmation {
        message: "Conversation deleted".to_string(),
    }))
}

async fn clear_messages(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<Confirmation>, ApiError> {
    state.conversations.clear_messages(&id).await?;
    Ok(Json(Confirmation {
        message: "Messages cleared".to_string(),
    }))
}

async fn get_state(State(state): State<Arc<ServerState>>) -> Json<AppState> {
    Json(state.conversations.state().await)
}

async fn toggle_bot(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<BotToggleResponse>, ApiError> {
    let simulate_bot = state.conversations.toggle_simulate_bot().await?;
    Ok(Json(BotToggleResponse { simulate_bot }))
}

async fn toggle_gemini(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<GeminiToggleResponse>, ApiError> {
    let gemini_enabled = state.conversations.toggle_gemini().await?;
    let message = format!(
        "Gemini AI {}",
        if gemini_enabled { "enabled" } else { "disabled" }
    );
    Ok(Json(GeminiToggleResponse {
        gemini_enabled,
        message,
    }))
}

async fn generate(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(request) = payload?;
    let prompt = request
        .prompt
        .ok_or_else(|| ChatError::validation("prompt is required"))?;

    let response = state.generator.generate(&prompt, &request.context).await?;
    Ok(Json(GenerateResponse {
        response,
        status: "success",
    }))
}

async fn gemini_status(State(state): State<Arc<ServerState>>) -> Json<GeminiStatusResponse> {
    Json(GeminiStatusResponse {
        gemini_enabled: state.conversations.gemini_enabled().await,
        api_configured: state.generator.is_configured(),
    })
}
