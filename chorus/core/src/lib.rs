//! Chorus Core - Headless Multi-Provider Streaming Chat
//!
//! Sends one question to several completion providers at once, turns each
//! streaming answer into render-ready blocks as it arrives, and commits the
//! finished turn to a transcript store once every provider is done.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Renderers / CLI                          │
//! │        watch<ProviderSnapshot>   watch<idle>   CommitEvent       │
//! └───────────────▲──────────────────────▲──────────────▲────────────┘
//!                 │                      │              │
//! ┌───────────────┴──────────────────────┴──────────────┴────────────┐
//! │                        TurnOrchestrator                          │
//! │  ┌──────────────────┐  ┌──────────────────┐                      │
//! │  │ ProviderTask (A) │  │ ProviderTask (B) │  ...                 │
//! │  │ StreamAccumulator│  │ StreamAccumulator│                      │
//! │  │   BlockParser    │  │   BlockParser    │                      │
//! │  └────────▲─────────┘  └────────▲─────────┘                      │
//! │           │                     │            commit barrier ───► │ TranscriptStore
//! └───────────┼─────────────────────┼────────────────────────────────┘
//!      CompletionProvider    CompletionProvider
//!        (Ollama, ...)         (Scripted, ...)
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use chorus_core::{
//!     EnabledProvider, MemoryTranscriptStore, OrchestratorConfig, ScriptedProvider,
//!     TurnOrchestrator,
//! };
//!
//! let providers = vec![EnabledProvider::new(
//!     "echo",
//!     "script",
//!     Arc::new(ScriptedProvider::new(["Hello ", "world\n\n"])),
//! )];
//! let store = Arc::new(MemoryTranscriptStore::new());
//! let orchestrator = TurnOrchestrator::new(providers, store, OrchestratorConfig::default())?;
//!
//! let mut commits = orchestrator.subscribe_commits();
//! orchestrator.submit("Say hello");
//! let event = commits.recv().await?;
//! ```
//!
//! # Module Overview
//!
//! - [`blocks`]: Incremental block parser and per-provider accumulator
//! - [`provider`]: Completion provider trait and implementations
//! - [`orchestrator`]: Turn orchestration and the commit barrier
//! - [`retry`]: Single-provider retry and question editing
//! - [`store`]: Transcript store trait and implementations
//! - [`config`]: TOML + environment configuration
//! - [`messages`]: Message, turn and identifier types
//! - [`export`]: Markdown transcript export

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod blocks;
pub mod config;
pub mod export;
pub mod messages;
pub mod orchestrator;
pub mod provider;
pub mod retry;
pub mod store;

// Block rendering exports
pub use blocks::{Block, BlockParser, BlockType, IncrementalUpdate, StreamAccumulator};

// Message exports
pub use messages::{Message, MessageId, MessageRole, ProviderId, Turn, TurnId};

// Provider exports
pub use provider::{
    BackendConfig, ChannelHandle, ChannelProvider, CompletionProvider, CompletionRequest,
    HistoryMessage, OllamaProvider, OpenedStream, ProviderEvent, ScriptedProvider,
};

// Orchestration exports
pub use orchestrator::{
    CommitEvent, EnabledProvider, OrchestratorConfig, OrchestratorError, ProviderSnapshot,
    ProviderState, TurnOrchestrator,
};
pub use retry::RetryCoordinator;

// Store exports
pub use store::{
    JsonFileStore, Mask, MaskStore, MemoryTranscriptStore, StoreError, TranscriptStore,
};

// Config exports
pub use config::{
    default_config_path, default_masks_path, default_store_path, load_config,
    load_config_from_path, load_config_with_env, ChorusConfig, ChorusToml, ConfigError,
    ConfigOverrides, ConfigSource, ProviderKind, ProviderSettings,
};

// Export helpers
pub use export::{
    chat_title, default_title, export_markdown, export_markdown_at, ChatExport, UNTITLED_CHAT,
};
