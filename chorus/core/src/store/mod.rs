//! Transcript Storage
//!
//! Committed turns are handed to a [`TranscriptStore`]. The orchestrator only
//! needs the trait; which backend is used is a wiring decision.
//!
//! - [`MemoryTranscriptStore`]: process memory, with write-failure injection
//! - [`JsonFileStore`]: one JSON document on disk, atomic rewrite per change
//!
//! [`MaskStore`] keeps named system prompt presets in the same file format.

mod document;
mod json_file;
mod masks;
mod memory;
mod traits;

pub use json_file::JsonFileStore;
pub use masks::{Mask, MaskStore};
pub use memory::MemoryTranscriptStore;
pub use traits::{StoreError, TranscriptStore};
