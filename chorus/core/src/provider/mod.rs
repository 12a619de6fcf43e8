//! Completion Providers
//!
//! Abstracted access to AI completion providers through a common trait.
//!
//! # Available Providers
//!
//! - **Ollama**: Local LLM server, NDJSON streaming
//! - **Scripted**: In-process replay of fixed chunks (demos, tests)
//! - **Channel**: Caller-driven streams for deterministic tests
//!
//! # Usage
//!
//! ```ignore
//! use chorus_core::provider::{CompletionProvider, CompletionRequest, OllamaProvider};
//!
//! let provider = OllamaProvider::new("localhost", 11434)?;
//! let request = CompletionRequest::new("Hello!", "llama3.2");
//! let rx = provider.stream(&request).await?;
//! ```

mod ollama;
mod scripted;
mod traits;

pub use ollama::{OllamaProvider, DEFAULT_OLLAMA_PORT};
pub use scripted::{ChannelHandle, ChannelProvider, OpenedStream, ScriptedProvider};
pub use traits::{
    BackendConfig, CompletionProvider, CompletionRequest, HistoryMessage, ProviderEvent,
};
