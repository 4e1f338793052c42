use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio::fs;

/// A directory entry as reported by [`FileStore::list`]
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: String,
    pub modified: DateTime<Utc>,
}

/// Filesystem collaborator. Paths are logical (`dir/name`), resolved by the
/// implementation; nothing above this trait touches the OS filesystem
/// directly.
#[async_trait::async_trait]
pub trait FileStore: Send + Sync {
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;
    async fn read(&self, path: &str) -> Result<Vec<u8>>;
    async fn delete(&self, path: &str) -> Result<()>;
    async fn list(&self, dir: &str) -> Result<Vec<FileEntry>>;
    async fn exists(&self, path: &str) -> bool;
}

/// Local filesystem store rooted at a data directory
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait::async_trait]
impl FileStore for LocalFileStore {
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        fs::write(&full, bytes)
            .await
            .with_context(|| format!("Failed to write file: {}", full.display()))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path);
        fs::read(&full)
            .await
            .with_context(|| format!("Failed to read file: {}", full.display()))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        fs::remove_file(&full)
            .await
            .with_context(|| format!("Failed to delete file: {}", full.display()))
    }

    async fn list(&self, dir: &str) -> Result<Vec<FileEntry>> {
        let full = self.resolve(dir);
        match fs::metadata(&full).await {
            Ok(meta) if meta.is_dir() => {}
            _ => return Ok(Vec::new()),
        }

        let mut entries = Vec::new();
        let mut reader = fs::read_dir(&full)
            .await
            .with_context(|| format!("Failed to list directory: {}", full.display()))?;

        while let Some(entry) = reader.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let modified: DateTime<Utc> = metadata
                .modified()
                .map(DateTime::from)
                .unwrap_or_else(|_| Utc::now());
            entries.push(FileEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                modified,
            });
        }

        Ok(entries)
    }

    async fn exists(&self, path: &str) -> bool {
        fs::try_exists(self.resolve(path)).await.unwrap_or(false)
    }
}
