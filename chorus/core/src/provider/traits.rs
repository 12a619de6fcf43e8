//! Completion Provider Traits
//!
//! Trait definitions for completion providers. This abstraction lets the
//! orchestrator fan one question out to Ollama, OpenAI, Anthropic, ... without
//! knowing anything about their wire formats.
//!
//! # Design Philosophy
//!
//! A provider only has to turn a [`CompletionRequest`] into an ordered stream
//! of [`ProviderEvent`]s: zero or more `Chunk`s followed by at most one `Done`
//! or `Error`. Authentication, request construction and transport stay inside
//! the implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::messages::MessageRole;

/// Stream events produced by a provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderEvent {
    /// A slice of the answer text
    Chunk(String),
    /// Answer completed successfully
    Done,
    /// Answer failed; no further events follow
    Error(String),
}

impl ProviderEvent {
    /// Whether this event ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }
}

/// One prior message replayed to the provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryMessage {
    /// Who said it
    pub role: MessageRole,
    /// What was said
    pub content: String,
}

/// A completion request for a single provider
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    /// The question being asked
    pub question: String,
    /// Model to use (provider-specific identifier)
    pub model: String,
    /// Prior conversation, oldest first
    pub history: Vec<HistoryMessage>,
    /// System prompt (optional, prepended to the conversation)
    pub system: Option<String>,
    /// Temperature (0.0-1.0, higher = more creative)
    pub temperature: f32,
    /// Maximum tokens in the answer (0 = provider default)
    pub max_tokens: u32,
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            question: String::new(),
            model: String::new(),
            history: Vec::new(),
            system: None,
            temperature: 0.7,
            max_tokens: 0,
        }
    }
}

impl CompletionRequest {
    /// Create a new request with question and model
    pub fn new(question: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }

    /// Set system prompt
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set prior conversation
    #[must_use]
    pub fn with_history(mut self, history: Vec<HistoryMessage>) -> Self {
        self.history = history;
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Completion provider trait
///
/// Implement this trait to add support for another AI provider.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider display name (e.g., "Ollama")
    fn name(&self) -> &str;

    /// Check if the provider is reachable
    async fn health_check(&self) -> bool;

    /// Start a streaming completion
    ///
    /// Returns a channel receiver that yields events as they arrive. An `Err`
    /// means the stream could not be opened at all; the orchestrator records
    /// it the same way as an `Error` event.
    async fn stream(
        &self,
        request: &CompletionRequest,
    ) -> anyhow::Result<mpsc::Receiver<ProviderEvent>>;
}

/// Provider connection configuration
#[derive(Clone, Debug, PartialEq)]
pub enum BackendConfig {
    /// Ollama server
    Ollama {
        /// Host address
        host: String,
        /// Port number
        port: u16,
    },
    /// In-process provider replaying fixed chunks
    Scripted {
        /// Chunks emitted in order before `Done`
        chunks: Vec<String>,
        /// Error emitted after the chunks instead of `Done`
        fail_with: Option<String>,
    },
    /// Custom provider wired up by the embedding application
    Custom {
        /// Provider name
        name: String,
        /// Configuration key-value pairs
        config: HashMap<String, String>,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Ollama {
            host: "localhost".to_string(),
            port: 11434,
        }
    }
}

impl BackendConfig {
    /// Create Ollama configuration
    pub fn ollama(host: impl Into<String>, port: u16) -> Self {
        Self::Ollama {
            host: host.into(),
            port,
        }
    }

    /// Short kind name used in logs and config files
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Ollama { .. } => "ollama",
            Self::Scripted { .. } => "scripted",
            Self::Custom { name, .. } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_request_builder() {
        let request = CompletionRequest::new("Hello", "llama3.2")
            .with_temperature(1.5)
            .with_system("You are helpful")
            .with_max_tokens(100)
            .with_history(vec![HistoryMessage {
                role: MessageRole::User,
                content: "earlier".to_string(),
            }]);

        assert_eq!(request.question, "Hello");
        assert_eq!(request.model, "llama3.2");
        assert!((request.temperature - 1.0).abs() < f32::EPSILON);
        assert_eq!(request.system, Some("You are helpful".to_string()));
        assert_eq!(request.max_tokens, 100);
        assert_eq!(request.history.len(), 1);
    }

    #[test]
    fn test_terminal_events() {
        assert!(!ProviderEvent::Chunk("x".into()).is_terminal());
        assert!(ProviderEvent::Done.is_terminal());
        assert!(ProviderEvent::Error("boom".into()).is_terminal());
    }

    #[test]
    fn test_backend_config_default() {
        match BackendConfig::default() {
            BackendConfig::Ollama { host, port } => {
                assert_eq!(host, "localhost");
                assert_eq!(port, 11434);
            }
            other => panic!("Expected Ollama config, got {other:?}"),
        }
        assert_eq!(BackendConfig::ollama("h", 1).kind(), "ollama");
    }
}
