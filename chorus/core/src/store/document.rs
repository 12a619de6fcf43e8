//! Whole-file JSON documents with atomic rewrite

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::traits::StoreError;

/// One JSON document on disk
///
/// Writes go through `<path>.tmp` and a rename, so a crash mid-write leaves
/// the previous version intact.
#[derive(Debug, Clone)]
pub(crate) struct JsonDocument {
    path: PathBuf,
}

impl JsonDocument {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Decode the document, `None` when the file does not exist yet
    pub(crate) async fn read<T: DeserializeOwned>(&self) -> Result<Option<T>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    pub(crate) async fn write<T: Serialize>(&self, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_vec_pretty(value)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))
    }

    pub(crate) fn unsupported_version(&self, kind: &str, version: u32) -> StoreError {
        StoreError::Unavailable(format!(
            "unsupported {kind} version {version} in {}",
            self.path.display()
        ))
    }
}
