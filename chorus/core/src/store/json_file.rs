//! JSON file transcript store
//!
//! The whole transcript lives in one JSON document:
//!
//! ```json
//! { "version": 1, "title": "...", "turns": [ { "id": "turn_...", "question": {...}, "answers": [...] } ] }
//! ```
//!
//! `title` is optional and omitted until one is set.
//!
//! Every write rewrites the document through a temporary file and a rename, so
//! a crash mid-write leaves the previous version intact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::document::JsonDocument;
use super::traits::{
    recent_turns, truncate_turns, update_answer_in, upsert_turn, StoreError, TranscriptStore,
};
use crate::messages::{Message, MessageId, Turn, TurnId};

/// Current on-disk format version
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct TranscriptFile {
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default)]
    turns: Vec<Turn>,
}

impl Default for TranscriptFile {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            title: None,
            turns: Vec::new(),
        }
    }
}

/// Transcript store backed by a single JSON file
#[derive(Debug)]
pub struct JsonFileStore {
    document: JsonDocument,
    /// Serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Create a store at `path`; the file is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            document: JsonDocument::new(path.into()),
            lock: Mutex::new(()),
        }
    }

    /// Backing file path
    #[must_use]
    pub fn path(&self) -> &Path {
        self.document.path()
    }

    async fn read(&self) -> Result<TranscriptFile, StoreError> {
        let file: TranscriptFile = self.document.read().await?.unwrap_or_default();
        if file.version != FORMAT_VERSION {
            return Err(self.document.unsupported_version("transcript", file.version));
        }
        Ok(file)
    }

    async fn write(&self, file: &TranscriptFile) -> Result<(), StoreError> {
        self.document.write(file).await?;
        tracing::debug!(path = %self.path().display(), turns = file.turns.len(), "Wrote transcript");
        Ok(())
    }
}

#[async_trait]
impl TranscriptStore for JsonFileStore {
    async fn persist(&self, question: &Message, answers: &[Message]) -> Result<TurnId, StoreError> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;
        let id = upsert_turn(&mut file.turns, question, answers);
        self.write(&file).await?;
        Ok(id)
    }

    async fn load_recent(&self, limit: usize) -> Result<Vec<Turn>, StoreError> {
        let _guard = self.lock.lock().await;
        let file = self.read().await?;
        Ok(recent_turns(&file.turns, limit))
    }

    async fn update_answer(&self, id: &MessageId, content: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;
        update_answer_in(&mut file.turns, id, content)?;
        self.write(&file).await
    }

    async fn truncate_from(&self, id: &MessageId) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;
        let removed = truncate_turns(&mut file.turns, id);
        if removed > 0 {
            self.write(&file).await?;
        }
        Ok(removed)
    }

    async fn title(&self) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.title)
    }

    async fn set_title(&self, title: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;
        file.title = Some(title.trim().to_string()).filter(|t| !t.is_empty());
        self.write(&file).await
    }
}
