//! Mask presets
//!
//! A mask is a named system prompt. Masks live in their own JSON document
//! next to the transcript:
//!
//! ```json
//! { "version": 1, "masks": [ { "id": 1, "name": "Reviewer", "system_prompt": "...", "updated_at": 0, "last_used_at": 0 } ] }
//! ```
//!
//! Selecting a mask for a turn stamps `last_used_at`, which orders
//! [`MaskStore::fetch_recent`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::document::JsonDocument;
use super::traits::StoreError;
use crate::messages::now_secs;

const FORMAT_VERSION: u32 = 1;

/// A named system prompt preset
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mask {
    /// Stable numeric ID, assigned on first save
    pub id: u32,
    /// Display name
    pub name: String,
    /// System prompt sent with every request while the mask is selected
    pub system_prompt: String,
    /// Unix seconds of the last edit
    pub updated_at: i64,
    /// Unix seconds of the last selection, 0 if never used
    #[serde(default)]
    pub last_used_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct MaskFile {
    version: u32,
    #[serde(default)]
    masks: Vec<Mask>,
}

impl Default for MaskFile {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            masks: Vec::new(),
        }
    }
}

/// Mask presets backed by a JSON file
#[derive(Debug)]
pub struct MaskStore {
    document: JsonDocument,
    lock: Mutex<()>,
}

impl MaskStore {
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

    async fn read(&self) -> Result<MaskFile, StoreError> {
        let file: MaskFile = self.document.read().await?.unwrap_or_default();
        if file.version != FORMAT_VERSION {
            return Err(self.document.unsupported_version("mask file", file.version));
        }
        Ok(file)
    }

    /// Every mask, most recently edited first
    pub async fn fetch_all(&self) -> Result<Vec<Mask>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut masks = self.read().await?.masks;
        masks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(masks)
    }

    /// Up to `limit` masks, most recently used first
    pub async fn fetch_recent(&self, limit: usize) -> Result<Vec<Mask>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut masks = self.read().await?.masks;
        masks.sort_by(|a, b| {
            b.last_used_at
                .cmp(&a.last_used_at)
                .then(b.updated_at.cmp(&a.updated_at))
                .then(b.id.cmp(&a.id))
        });
        masks.truncate(limit);
        Ok(masks)
    }

    /// Look up one mask by ID
    pub async fn fetch_by_id(&self, id: u32) -> Result<Option<Mask>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.masks.into_iter().find(|m| m.id == id))
    }

    /// Look up a mask by numeric ID or by name (case-insensitive)
    pub async fn resolve(&self, key: &str) -> Result<Option<Mask>, StoreError> {
        let key = key.trim();
        let _guard = self.lock.lock().await;
        let masks = self.read().await?.masks;
        let by_id = key.parse::<u32>().ok();
        Ok(masks
            .into_iter()
            .find(|m| Some(m.id) == by_id || m.name.eq_ignore_ascii_case(key)))
    }

    /// Create a mask, or replace the one with `id`
    ///
    /// Name and prompt are trimmed. `None` or `Some(0)` assigns a fresh ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for a blank name or prompt, or an I/O
    /// error if the file cannot be written.
    pub async fn upsert(
        &self,
        name: &str,
        system_prompt: &str,
        id: Option<u32>,
    ) -> Result<Mask, StoreError> {
        let name = name.trim();
        let system_prompt = system_prompt.trim();
        if name.is_empty() || system_prompt.is_empty() {
            return Err(StoreError::Invalid(
                "mask name and system prompt must not be blank".to_string(),
            ));
        }

        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;
        let id = match id.filter(|id| *id > 0) {
            Some(id) => id,
            None => file.masks.iter().map(|m| m.id).max().unwrap_or(0) + 1,
        };
        let last_used_at = file
            .masks
            .iter()
            .find(|m| m.id == id)
            .map_or(0, |m| m.last_used_at);

        let mask = Mask {
            id,
            name: name.to_string(),
            system_prompt: system_prompt.to_string(),
            updated_at: now_secs(),
            last_used_at,
        };
        file.masks.retain(|m| m.id != id);
        file.masks.push(mask.clone());
        self.document.write(&file).await?;

        tracing::info!(mask_id = id, name = %mask.name, "Saved mask");
        Ok(mask)
    }

    /// Remove a mask; returns whether it existed
    pub async fn delete(&self, id: u32) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;
        let before = file.masks.len();
        file.masks.retain(|m| m.id != id);
        if file.masks.len() == before {
            return Ok(false);
        }
        self.document.write(&file).await?;
        tracing::info!(mask_id = id, "Deleted mask");
        Ok(true)
    }

    /// Record that a mask was just selected
    pub async fn touch(&self, id: u32) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;
        if let Some(mask) = file.masks.iter_mut().find(|m| m.id == id) {
            mask.last_used_at = now_secs();
            self.document.write(&file).await?;
        }
        Ok(())
    }
}
