//! Conversation and message operations on top of [`StateStore`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::llm::ContextMessage;

use super::error::{ChatError, ChatResult};
use super::reply_scheduler::{REPLY_CONTEXT_MESSAGES, ReplyJob};
use super::store::StateStore;
use super::types::{
    AppState, Conversation, DEFAULT_CONVERSATION_ID, DEFAULT_MESSAGE_STATUS, Message, Participant,
};

/// Message fields as submitted by a client; `who` and `text` are required.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MessageDraft {
    /// Author side.
    pub who: Option<Participant>,
    /// Message body.
    pub text: Option<String>,
    /// Delivery status, `"sent"` when omitted.
    pub status: Option<String>,
}

/// Result of appending a message.
#[derive(Debug)]
pub struct PostedMessage {
    /// The stored message.
    pub message: Message,
    /// Reply to schedule, present for human messages while generation is enabled.
    pub reply: Option<ReplyJob>,
}

/// CRUD over conversations. Every call is a full cycle on the store.
#[derive(Clone)]
pub struct ConversationService {
    store: Arc<StateStore>,
}

impl ConversationService {
    /// Create a service persisting through `store`.
    #[must_use]
    pub const fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    /// The whole persisted state.
    pub async fn state(&self) -> AppState {
        self.store.snapshot().await
    }

    /// All conversations keyed by id.
    pub async fn list_conversations(&self) -> BTreeMap<String, Conversation> {
        self.store.snapshot().await.conversations
    }

    /// One conversation.
    ///
    /// # Errors
    /// [`ChatError::NotFound`] if `id` is unknown.
    pub async fn get_conversation(&self, id: &str) -> ChatResult<Conversation> {
        self.store
            .snapshot()
            .await
            .conversations
            .remove(id)
            .ok_or_else(|| ChatError::not_found(id))
    }

    /// Succeeds when a conversation with `id` exists.
    ///
    /// # Errors
    /// [`ChatError::NotFound`] if `id` is unknown.
    pub async fn ensure_conversation(&self, id: &str) -> ChatResult<()> {
        if self.store.snapshot().await.conversations.contains_key(id) {
            Ok(())
        } else {
            Err(ChatError::not_found(id))
        }
    }

    /// Create an empty conversation named `name`.
    ///
    /// # Errors
    /// [`ChatError::Validation`] for a blank name, [`ChatError::Persistence`]
    /// if the state cannot be saved.
    pub async fn create_conversation(&self, name: &str) -> ChatResult<Conversation> {
        if name.trim().is_empty() {
            return Err(ChatError::validation("conversation name is required"));
        }

        let conversation = Conversation::new(name);
        let stored = conversation.clone();
        self.store
            .update(move |state| {
                state.conversations.insert(stored.id.clone(), stored);
                Ok(())
            })
            .await?;

        info!(id = %conversation.id, "conversation created");
        Ok(conversation)
    }

    /// Messages of a conversation, oldest first.
    ///
    /// # Errors
    /// [`ChatError::NotFound`] if `id` is unknown.
    pub async fn list_messages(&self, id: &str) -> ChatResult<Vec<Message>> {
        self.get_conversation(id).await.map(|c| c.messages)
    }

    /// Append a message to a conversation.
    ///
    /// The message is persisted before the reply decision is made.
    ///
    /// # Errors
    /// [`ChatError::NotFound`] if `id` is unknown, [`ChatError::Validation`]
    /// if `who` or `text` is missing, [`ChatError::Persistence`] on save failure.
    pub async fn add_message(&self, id: &str, draft: MessageDraft) -> ChatResult<PostedMessage> {
        self.store
            .update(|state| {
                let gemini_enabled = state.gemini_enabled;
                let conversation = state
                    .conversations
                    .get_mut(id)
                    .ok_or_else(|| ChatError::not_found(id))?;

                let who = draft
                    .who
                    .ok_or_else(|| ChatError::validation("field 'who' is required"))?;
                let text = draft
                    .text
                    .ok_or_else(|| ChatError::validation("field 'text' is required"))?;
                let status = draft
                    .status
                    .unwrap_or_else(|| DEFAULT_MESSAGE_STATUS.to_string());

                let message = Message::new(who, text, status);
                conversation.messages.push(message.clone());

                let reply = (who == Participant::Mine && gemini_enabled).then(|| ReplyJob {
                    conversation_id: conversation.id.clone(),
                    prompt: message.text.clone(),
                    context: conversation
                        .recent_messages(REPLY_CONTEXT_MESSAGES)
                        .iter()
                        .map(ContextMessage::from)
                        .collect(),
                });

                Ok(PostedMessage { message, reply })
            })
            .await
    }

    /// Delete a conversation other than the default one.
    ///
    /// If it was the current conversation, the default becomes current.
    ///
    /// # Errors
    /// [`ChatError::NotFound`] if `id` is unknown, [`ChatError::Validation`]
    /// for the default conversation, [`ChatError::Persistence`] on save failure.
    pub async fn delete_conversation(&self, id: &str) -> ChatResult<()> {
        self.store
            .update(|state| {
                if !state.conversations.contains_key(id) {
                    return Err(ChatError::not_found(id));
                }
                if id == DEFAULT_CONVERSATION_ID {
                    return Err(ChatError::validation(
                        "the default conversation cannot be deleted",
                    ));
                }

                state.conversations.remove(id);
                if state.current_conv_id == id {
                    state.current_conv_id = DEFAULT_CONVERSATION_ID.to_string();
                }
                Ok(())
            })
            .await?;

        info!(%id, "conversation deleted");
        Ok(())
    }

    /// Remove every message of a conversation.
    ///
    /// # Errors
    /// [`ChatError::NotFound`] if `id` is unknown, [`ChatError::Persistence`] on save failure.
    pub async fn clear_messages(&self, id: &str) -> ChatResult<()> {
        self.store
            .update(|state| {
                let conversation = state
                    .conversations
                    .get_mut(id)
                    .ok_or_else(|| ChatError::not_found(id))?;
                conversation.messages.clear();
                Ok(())
            })
            .await
    }

    /// Flip the simulated-bot flag and return its new value.
    ///
    /// # Errors
    /// [`ChatError::Persistence`] on save failure.
    pub async fn toggle_simulate_bot(&self) -> ChatResult<bool> {
        self.store
            .update(|state| {
                state.simulate_bot = !state.simulate_bot;
                Ok(state.simulate_bot)
            })
            .await
    }

    /// Flip the auto-reply flag and return its new value.
    ///
    /// # Errors
    /// [`ChatError::Persistence`] on save failure.
    pub async fn toggle_gemini(&self) -> ChatResult<bool> {
        let enabled = self
            .store
            .update(|state| {
                state.gemini_enabled = !state.gemini_enabled;
                Ok(state.gemini_enabled)
            })
            .await?;
        info!(enabled, "gemini auto-reply toggled");
        Ok(enabled)
    }

    /// Current value of the auto-reply flag.
    pub async fn gemini_enabled(&self) -> bool {
        self.store.snapshot().await.gemini_enabled
    }
}
