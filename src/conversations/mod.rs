//! Conversation management module.
//!
//! This module provides the persisted data model, the JSON file store,
//! conversation CRUD operations and the delayed reply worker.

pub mod error;
pub mod reply_scheduler;
pub mod service;
pub mod store;
pub mod types;

pub use error::{ChatError, ChatResult};
pub use reply_scheduler::{ReplyJob, ReplyScheduler};
pub use service::{ConversationService, MessageDraft, PostedMessage};
pub use store::StateStore;
pub use types::{AppState, Conversation, Message, Participant};
