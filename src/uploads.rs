//! Upload handler - stores signature and avatar files on disk

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::Result;
use crate::models::NewFile;

/// A file written to the uploads directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub original_name: String,
    /// File name relative to the uploads directory
    pub stored_path: String,
}

impl From<StoredUpload> for NewFile {
    fn from(upload: StoredUpload) -> Self {
        Self {
            name: upload.original_name,
            path: upload.stored_path,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Writes `bytes` under a fresh random name that keeps the original extension
    pub async fn store(&self, original_name: &str, bytes: &[u8]) -> Result<StoredUpload> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let stored_path = stored_name(original_name);
        tokio::fs::write(self.dir.join(&stored_path), bytes).await?;

        tracing::debug!(original_name, stored_path = %stored_path, "Stored upload");
        Ok(StoredUpload {
            original_name: original_name.to_string(),
            stored_path,
        })
    }

    /// Removes an upload that ended up unused
    pub async fn discard(&self, upload: &StoredUpload) {
        if let Err(e) = tokio::fs::remove_file(self.dir.join(&upload.stored_path)).await {
            tracing::warn!(stored_path = %upload.stored_path, "Could not remove upload: {}", e);
        }
    }
}

fn stored_name(original_name: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    let extension = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()));

    match extension {
        Some(ext) => format!("{}.{}", id, ext.to_ascii_lowercase()),
        None => id,
    }
}
