//! Streaming Turn Orchestration
//!
//! One question fans out to every enabled provider. Each provider streams into
//! its own accumulator; when the last one reaches a terminal state the turn is
//! committed to the transcript store exactly once.
//!
//! # Architecture
//!
//! ```text
//!                 submit(question)
//!                        │
//!                        ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                    TurnOrchestrator                       │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐     │
//! │  │ slot: ollama │  │ slot: openai │  │ slot: groq   │ ... │
//! │  │ Loading      │  │ Idle (done)  │  │ Loading      │     │
//! │  │ accumulator  │  │ accumulator  │  │ accumulator  │     │
//! │  └──────▲───────┘  └──────▲───────┘  └──────▲───────┘     │
//! │         │                 │                 │             │
//! └─────────┼─────────────────┼─────────────────┼─────────────┘
//!      ProviderTask      ProviderTask      ProviderTask
//!           │                 │                 │
//!      Chunk/Done/Error  Chunk/Done/Error  Chunk/Done/Error
//! ```
//!
//! # Commit barrier
//!
//! Every `Loading -> Idle` transition recomputes the aggregate idle flag in the
//! same critical section. When all providers are idle and a question is held,
//! the turn is snapshotted and marked committing before the lock is released,
//! so no second transition can fire it again. Persistence runs outside the
//! lock; on failure the turn stays held and [`TurnOrchestrator::commit`] can
//! be called again.
//!
//! # Rendering
//!
//! Renderers subscribe to per-provider `watch` snapshots
//! ([`TurnOrchestrator::subscribe`]), the aggregate idle flag and commit
//! events. They never touch the accumulators directly.

mod state;
mod task;
mod turn;

pub use state::{
    CommitEvent, EnabledProvider, OrchestratorConfig, OrchestratorError, ProviderSnapshot,
    ProviderState,
};
pub use turn::TurnOrchestrator;
