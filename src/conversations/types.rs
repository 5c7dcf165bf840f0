//! Persisted data model: the whole application state, conversations and messages.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Id of the conversation that always exists and cannot be deleted.
pub const DEFAULT_CONVERSATION_ID: &str = "conv-default";

/// Prefix of every generated conversation id.
pub const CONVERSATION_ID_PREFIX: &str = "conv-";

/// Status given to a message when the sender does not provide one.
pub const DEFAULT_MESSAGE_STATUS: &str = "sent";

/// Status given to generated replies.
pub const DELIVERED_STATUS: &str = "delivered";

const DEFAULT_CONVERSATION_NAME: &str = "Conversation with Gemini AI";
const WELCOME_TEXT: &str = "Hello! I'm Gemini AI. How can I help you today?";

/// Which side of the conversation wrote a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Participant {
    /// The human using the front-end.
    Mine,
    /// The other side (the bot or the generator).
    Their,
}

impl Participant {
    /// Role name understood by the generator.
    #[must_use]
    pub const fn generator_role(self) -> &'static str {
        match self {
            Self::Mine => "user",
            Self::Their => "model",
        }
    }

    /// Read a role leniently: `"mine"` is the human, any other value the other side.
    #[must_use]
    pub fn from_lenient(raw: &str) -> Self {
        if raw == "mine" { Self::Mine } else { Self::Their }
    }

    /// `deserialize_with` helper for documents written by older or foreign
    /// clients, where `who` may hold any string.
    ///
    /// # Errors
    /// Fails only when the value is not a string.
    pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_lenient(&raw))
    }
}

/// A single timestamped utterance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier (UUID v4).
    pub id: String,
    /// Author side.
    #[serde(deserialize_with = "Participant::deserialize_lenient")]
    pub who: Participant,
    /// Message body.
    pub text: String,
    /// RFC 3339 creation time.
    #[serde(rename = "ts", alias = "timestamp")]
    pub timestamp: String,
    /// Free-form delivery status.
    #[serde(default = "default_status")]
    pub status: String,
}

impl Message {
    /// Build a message with a fresh id and the current time.
    #[must_use]
    pub fn new(who: Participant, text: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            who,
            text: text.into(),
            timestamp: now_timestamp(),
            status: status.into(),
        }
    }
}

/// A named, ordered thread of messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier, immutable after creation.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Messages in chronological order.
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Create an empty conversation with a generated `conv-` id.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: format!("{CONVERSATION_ID_PREFIX}{}", Uuid::new_v4()),
            name: name.into(),
            messages: Vec::new(),
        }
    }

    /// The default conversation seeded with a welcome message.
    #[must_use]
    pub fn seeded_default() -> Self {
        Self {
            id: DEFAULT_CONVERSATION_ID.to_string(),
            name: DEFAULT_CONVERSATION_NAME.to_string(),
            messages: vec![Message::new(
                Participant::Their,
                WELCOME_TEXT,
                DELIVERED_STATUS,
            )],
        }
    }

    /// The last `n` messages, oldest first.
    #[must_use]
    pub fn recent_messages(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }
}

/// Full persisted snapshot of the application.
///
/// Every field falls back to its default when missing from the stored document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppState {
    /// Conversations keyed by id.
    #[serde(default)]
    pub conversations: BTreeMap<String, Conversation>,
    /// Conversation selected in the front-end.
    #[serde(rename = "currentConvId", default = "default_current_conversation")]
    pub current_conv_id: String,
    /// Legacy simulated-bot flag.
    #[serde(rename = "simulateBot", default)]
    pub simulate_bot: bool,
    /// Whether human messages trigger a generated reply.
    #[serde(rename = "geminiEnabled", default)]
    pub gemini_enabled: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            conversations: BTreeMap::new(),
            current_conv_id: default_current_conversation(),
            simulate_bot: false,
            gemini_enabled: false,
        }
    }
}

impl AppState {
    /// Insert the seeded default conversation if it is missing.
    ///
    /// Returns `true` when the state changed.
    pub fn ensure_default_conversation(&mut self) -> bool {
        if self.conversations.contains_key(DEFAULT_CONVERSATION_ID) {
            return false;
        }
        self.conversations.insert(
            DEFAULT_CONVERSATION_ID.to_string(),
            Conversation::seeded_default(),
        );
        true
    }
}

/// Current UTC time as an RFC 3339 string with microsecond precision.
#[must_use]
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn default_status() -> String {
    DEFAULT_MESSAGE_STATUS.to_string()
}

fn default_current_conversation() -> String {
    DEFAULT_CONVERSATION_ID.to_string()
}
