//! JSON-file-backed application state store.
//!
//! The whole [`AppState`] lives in one document that is read and written in
//! full on every call. Mutations go through [`StateStore::update`], which
//! holds an async mutex across the load-modify-save cycle so concurrent
//! requests cannot overwrite each other.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use super::error::{ChatError, ChatResult};
use super::types::AppState;

/// Store for the persisted application state.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    gate: Mutex<()>,
}

impl StateStore {
    /// Create a store backed by the file at `path`. Nothing is read yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            gate: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the backing file.
    ///
    /// A missing file yields the default state. An unreadable or malformed
    /// file also yields the default state; its content is lost on the next save.
    /// This does not take the store lock.
    pub async fn load(&self) -> AppState {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "state file absent, using defaults");
                return AppState::default();
            }
            Err(err) => {
                warn!(path = %self.path.display(), %err, "state file unreadable, using defaults");
                return AppState::default();
            }
        };

        match serde_json::from_str::<AppState>(&raw) {
            Ok(state) => state,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "state file malformed, using defaults");
                AppState::default()
            }
        }
    }

    /// Overwrite the backing file with `state`.
    ///
    /// Returns `false` if serialization or the write failed; the error is logged.
    /// This does not take the store lock.
    pub async fn save(&self, state: &AppState) -> bool {
        match self.write(state).await {
            Ok(()) => true,
            Err(err) => {
                error!(path = %self.path.display(), %err, "failed to save state");
                false
            }
        }
    }

    async fn write(&self, state: &AppState) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, json).await
    }

    /// Make sure the default conversation exists, persist, and return the state.
    pub async fn init_defaults(&self) -> AppState {
        let _guard = self.gate.lock().await;
        let mut state = self.load().await;
        if state.ensure_default_conversation() {
            debug!("seeded default conversation");
        }
        if !self.save(&state).await {
            warn!("default state could not be persisted");
        }
        state
    }

    /// Read the current state, ordered after any in-flight mutation.
    pub async fn snapshot(&self) -> AppState {
        let _guard = self.gate.lock().await;
        self.load().await
    }

    /// Run a serialized read-modify-write cycle.
    ///
    /// `mutate` works on a freshly loaded state. If it succeeds the state is
    /// saved and its value returned; if it fails nothing is written.
    ///
    /// # Errors
    /// Returns the error produced by `mutate`, or [`ChatError::Persistence`]
    /// when the save fails.
    pub async fn update<T, F>(&self, mutate: F) -> ChatResult<T>
    where
        F: FnOnce(&mut AppState) -> ChatResult<T>,
    {
        let _guard = self.gate.lock().await;
        let mut state = self.load().await;
        let value = mutate(&mut state)?;
        if self.save(&state).await {
            Ok(value)
        } else {
            Err(ChatError::Persistence(self.path.display().to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::conversations::types::{
        Conversation, DEFAULT_CONVERSATION_ID, Message, Participant,
    };

    fn temp_store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        (dir, store)
    }

    #[tokio::test]
    async fn test_load_missing_file_returns_default() {
        let (_dir, store) = temp_store();
        assert_eq!(store.load().await, AppState::default());
    }

    #[tokio::test]
    async fn test_load_corrupted_file_returns_default() {
        let (_dir, store) = temp_store();
        tokio::fs::write(store.path(), "{ not json").await.unwrap();
        assert_eq!(store.load().await, AppState::default());

        tokio::fs::write(store.path(), r#"{"conversations": 42}"#)
            .await
            .unwrap();
        assert_eq!(store.load().await, AppState::default());
    }

    #[tokio::test]
    async fn test_load_backfills_missing_keys() {
        let (_dir, store) = temp_store();
        tokio::fs::write(store.path(), r#"{"geminiEnabled": true}"#)
            .await
            .unwrap();

        let state = store.load().await;
        assert!(state.gemini_enabled);
        assert!(state.conversations.is_empty());
        assert_eq!(state.current_conv_id, DEFAULT_CONVERSATION_ID);
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips() {
        let (_dir, store) = temp_store();
        let mut state = AppState::default();
        let mut conversation = Conversation::new("Olá");
        conversation
            .messages
            .push(Message::new(Participant::Mine, "ção ✓", "read"));
        state.current_conv_id = conversation.id.clone();
        state
            .conversations
            .insert(conversation.id.clone(), conversation);
        state.simulate_bot = true;
        state.gemini_enabled = true;

        assert!(store.save(&state).await);
        assert_eq!(store.load().await, state);

        let raw = tokio::fs::read_to_string(store.path()).await.unwrap();
        assert!(raw.contains("ção ✓"));
        assert!(raw.contains("\n  \"conversations\""));
    }

    #[tokio::test]
    async fn test_save_failure_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        assert!(!store.save(&AppState::default()).await);
    }

    #[tokio::test]
    async fn test_init_defaults_is_idempotent() {
        let (_dir, store) = temp_store();
        let first = store.init_defaults().await;
        let second = store.init_defaults().await;

        assert!(first.conversations.contains_key(DEFAULT_CONVERSATION_ID));
        assert_eq!(first, second);
        assert_eq!(store.load().await, first);
    }

    #[tokio::test]
    async fn test_failed_update_writes_nothing() {
        let (_dir, store) = temp_store();
        let result: ChatResult<()> = store
            .update(|state| {
                state.gemini_enabled = true;
                Err(ChatError::validation("nope"))
            })
            .await;

        assert!(matches!(result, Err(ChatError::Validation(_))));
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let (_dir, store) = temp_store();
        let store = Arc::new(store);
        store.init_defaults().await;

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .update(|state| {
                        if let Some(conversation) =
                            state.conversations.get_mut(DEFAULT_CONVERSATION_ID)
                        {
                            conversation.messages.push(Message::new(
                                Participant::Mine,
                                i.to_string(),
                                "sent",
                            ));
                        }
                        Ok(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let state = store.snapshot().await;
        assert_eq!(state.conversations[DEFAULT_CONVERSATION_ID].messages.len(), 17);
    }
}
