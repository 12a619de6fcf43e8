//! Transcript Messages
//!
//! Identifiers and message types shared by the orchestrator, the providers and
//! the transcript store.
//!
//! A [`Message`] with no provider is a user question; a message tagged with a
//! [`ProviderId`] is that provider's answer. A [`Turn`] groups one question
//! with the answers of every provider that was enabled when it was asked.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current time as a Unix timestamp in seconds
#[must_use]
pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Unique message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("msg_{}", Uuid::new_v4().simple()))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a persisted turn
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub String);

impl TurnId {
    /// Generate a new unique turn ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("turn_{}", Uuid::new_v4().simple()))
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a completion provider ("ollama", "openai", ...)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(pub String);

impl ProviderId {
    /// Create a provider ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who authored a message, from a provider's point of view
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// The human asking questions
    User,
    /// The provider answering them
    Assistant,
    /// Instructions prepended to the conversation
    System,
}

/// A question or an answer in the transcript
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID (stable across retries of the same answer)
    pub id: MessageId,
    /// Message text
    pub content: String,
    /// Creation or completion time (Unix seconds)
    pub created_at: i64,
    /// Answering provider, `None` for user questions
    #[serde(default)]
    pub provider: Option<ProviderId>,
}

impl Message {
    /// Create a user question
    pub fn question(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            content: content.into(),
            created_at: now_secs(),
            provider: None,
        }
    }

    /// Create an empty answer for a provider, ready to be streamed into
    #[must_use]
    pub fn answer(provider: ProviderId) -> Self {
        Self {
            id: MessageId::new(),
            content: String::new(),
            created_at: now_secs(),
            provider: Some(provider),
        }
    }

    /// Whether this message is a user question
    #[must_use]
    pub fn is_question(&self) -> bool {
        self.provider.is_none()
    }

    /// Whether the content is empty or whitespace only
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Role of this message when replayed as conversation history
    #[must_use]
    pub fn role(&self) -> MessageRole {
        if self.is_question() {
            MessageRole::User
        } else {
            MessageRole::Assistant
        }
    }
}

/// One question plus every enabled provider's answer to it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Store-assigned turn identifier
    pub id: TurnId,
    /// The user question
    pub question: Message,
    /// Provider answers in declaration order
    pub answers: Vec<Message>,
}

impl Turn {
    /// Find the answer produced by `provider`
    #[must_use]
    pub fn answer_for(&self, provider: &ProviderId) -> Option<&Message> {
        self.answers
            .iter()
            .find(|m| m.provider.as_ref() == Some(provider))
    }

    /// Whether any message of this turn has the given ID
    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.question.id == *id || self.answers.iter().any(|m| m.id == *id)
    }

    /// Iterate the question followed by the answers
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        std::iter::once(&self.question).chain(self.answers.iter())
    }
}
