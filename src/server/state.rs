//! Application state shared across all request handlers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::conversations::{ConversationService, ReplyScheduler, StateStore};
use crate::llm::{GeminiClient, GeminiError, TextGenerator};

/// Shared server state.
pub struct ServerState {
    /// Conversation operations.
    pub conversations: ConversationService,
    /// Text generator for explicit and automatic replies.
    pub generator: Arc<dyn TextGenerator>,
    /// Delayed reply worker.
    pub replies: ReplyScheduler,
    /// Directory served for non-API paths.
    pub static_dir: PathBuf,
}

impl ServerState {
    /// Wire the state from its parts and start the reply worker.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(
        store: Arc<StateStore>,
        generator: Arc<dyn TextGenerator>,
        reply_delay: Duration,
        static_dir: PathBuf,
    ) -> Arc<Self> {
        let replies =
            ReplyScheduler::spawn(Arc::clone(&store), Arc::clone(&generator), reply_delay);

        Arc::new(Self {
            conversations: ConversationService::new(store),
            generator,
            replies,
            static_dir,
        })
    }

    /// Build the state described by `config` with a Gemini client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_config(config: &ServerConfig, store: Arc<StateStore>) -> Result<Arc<Self>, GeminiError> {
        let generator = GeminiClient::new(config.gemini_api_key.clone(), config.gemini_url.clone())?;
        Ok(Self::new(
            store,
            Arc::new(generator),
            config.reply_delay,
            config.static_dir.clone(),
        ))
    }
}
