//! Orchestrator types shared with renderers and callers

use std::sync::Arc;

use thiserror::Error;

use crate::blocks::Block;
use crate::messages::{MessageId, ProviderId, TurnId};
use crate::provider::CompletionProvider;
use crate::store::{Mask, StoreError};

/// Lifecycle of one provider within the active turn
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProviderState {
    /// Not streaming; either never dispatched or finished
    #[default]
    Idle,
    /// Stream dispatched, waiting for a terminal event
    Loading,
}

/// What a renderer sees for one provider
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderSnapshot {
    /// Answer text so far (or the final / error text)
    pub answer_text: String,
    /// Current block list, pending blocks last
    pub blocks: Vec<Block>,
    /// Current lifecycle state
    pub state: ProviderState,
}

/// Outcome of a commit barrier firing
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitEvent {
    /// The turn was persisted and the in-memory turn cleared
    Committed {
        /// Store-assigned turn ID
        turn_id: TurnId,
        /// ID of the committed question
        question_id: MessageId,
    },
    /// Persistence failed; the turn is still held and can be committed again
    Failed {
        /// Rendered store error
        error: String,
    },
}

/// Errors surfaced by the orchestrator
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The transcript store rejected a write
    #[error("Failed to persist turn: {0}")]
    Persist(#[from] StoreError),

    /// No providers were supplied
    #[error("At least one provider must be enabled")]
    NoProviders,

    /// Two providers share an ID
    #[error("Duplicate provider id: {0}")]
    DuplicateProvider(ProviderId),
}

/// A provider taking part in every turn
#[derive(Clone)]
pub struct EnabledProvider {
    /// Stable key ("ollama", "openai", ...)
    pub id: ProviderId,
    /// Model passed in each request
    pub model: String,
    /// Stream source
    pub provider: Arc<dyn CompletionProvider>,
}

impl EnabledProvider {
    /// Bundle an ID, a model and a provider
    pub fn new(
        id: impl Into<ProviderId>,
        model: impl Into<String>,
        provider: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            provider,
        }
    }
}

impl std::fmt::Debug for EnabledProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnabledProvider")
            .field("id", &self.id)
            .field("model", &self.model)
            .field("provider", &self.provider.name())
            .finish()
    }
}

/// Request parameters applied to every provider
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// System prompt sent with each request
    pub system_prompt: Option<String>,
    /// Sampling temperature (0.0-1.0)
    pub temperature: f32,
    /// Maximum answer tokens (0 = provider default)
    pub max_tokens: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            temperature: 0.7,
            max_tokens: 0,
        }
    }
}

impl OrchestratorConfig {
    /// Start turns with a mask's system prompt
    #[must_use]
    pub fn with_mask(mut self, mask: &Mask) -> Self {
        self.system_prompt = Some(mask.system_prompt.clone());
        self
    }
}
