//! Local content cache consulted by the source locator.
//!
//! A cache directory either carries a `manifest.json`:
//!
//! ```json
//! [{ "id": "device-1760637121685", "name": "clip.mp4", "timestamp": 1760637121685, "file": "a1.mp4" }]
//! ```
//!
//! or is a flat directory of media files, in which case each regular file is
//! an entry (id = file stem, name = file name, timestamp = mtime in ms).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cliprelay_common::error::{RelayError, RelayResult};
use cliprelay_media::MediaBlob;

/// Manifest file name inside a cache directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// One cached media file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: String,
    pub name: String,
    /// Capture time in Unix milliseconds, if known.
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// File path, relative to the cache directory.
    pub file: PathBuf,
}

/// A store of previously captured or picked media.
#[async_trait::async_trait]
pub trait ContentCache: Send + Sync {
    /// All entries, in a stable order.
    async fn entries(&self) -> RelayResult<Vec<CacheEntry>>;

    /// Content of one entry.
    async fn read(&self, entry: &CacheEntry) -> RelayResult<MediaBlob>;
}

/// [`ContentCache`] backed by a directory.
#[derive(Debug, Clone)]
pub struct DirectoryCache {
    root: PathBuf,
}

impl DirectoryCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn scan(&self) -> RelayResult<Vec<CacheEntry>> {
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        let mut entries = Vec::new();

        while let Some(item) = dir.next_entry().await? {
            let metadata = item.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let name = item.file_name().to_string_lossy().into_owned();
            if name == MANIFEST_FILE || name.starts_with('.') {
                continue;
            }
            let path = PathBuf::from(&name);
            let id = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.clone());
            let timestamp = metadata
                .modified()
                .ok()
                .map(|t| chrono::DateTime::<chrono::Utc>::from(t).timestamp_millis());

            entries.push(CacheEntry {
                id,
                name,
                timestamp,
                file: path,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[async_trait::async_trait]
impl ContentCache for DirectoryCache {
    async fn entries(&self) -> RelayResult<Vec<CacheEntry>> {
        let manifest = self.root.join(MANIFEST_FILE);
        match tokio::fs::read_to_string(&manifest).await {
            Ok(content) => {
                let entries: Vec<CacheEntry> = serde_json::from_str(&content)?;
                tracing::debug!(
                    path = %manifest.display(),
                    entries = entries.len(),
                    "Loaded cache manifest"
                );
                Ok(entries)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.scan().await,
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, entry: &CacheEntry) -> RelayResult<MediaBlob> {
        if entry.file.is_absolute()
            || entry
                .file
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(RelayError::config(format!(
                "Cache entry {} points outside the cache: {}",
                entry.id,
                entry.file.display()
            )));
        }
        MediaBlob::from_file(&self.root.join(&entry.file)).await
    }
}
