use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::audio::AudioEncoding;
use crate::store::fs::FileStore;

/// Directory (under the file store root) holding pre-commit recordings
pub const TEMP_DIR: &str = "temp-audio";

/// A recording's bytes before commit.
#[derive(Debug, Clone)]
pub struct TempArtifact {
    /// Session that produced this artifact
    pub session_id: String,
    /// File name within the temp directory (`<session_id>.<ext>`)
    pub file_name: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub encoding: AudioEncoding,
}

impl TempArtifact {
    pub fn path(&self) -> String {
        format!("{}/{}", TEMP_DIR, self.file_name)
    }
}

/// Store for temporary recording files.
///
/// File names embed the owning session id, so finding a session's artifact
/// is a prefix match. An in-memory index covers the steady state; after a
/// restart the only consumer of leftover files is the sweep, which works
/// from the directory listing (O(n) in the number of temp files — fine for
/// a local note store).
pub struct TempArtifactStore {
    files: Arc<dyn FileStore>,
    /// Session id → artifact, for saves made by this process
    index: Mutex<HashMap<String, TempArtifact>>,
    /// Sessions whose artifacts must never be swept
    owned: Mutex<HashSet<String>>,
}

impl TempArtifactStore {
    pub fn new(files: Arc<dyn FileStore>) -> Self {
        Self {
            files,
            index: Mutex::new(HashMap::new()),
            owned: Mutex::new(HashSet::new()),
        }
    }

    /// Register a live session before its capture begins. The sweep will
    /// not consider artifacts of claimed sessions, so claiming first closes
    /// the race between a startup sweep and a brand-new recording.
    pub fn claim(&self, session_id: &str) {
        self.owned.lock().unwrap().insert(session_id.to_string());
    }

    /// Drop a session's sweep protection (after commit or discard)
    pub fn release(&self, session_id: &str) {
        self.owned.lock().unwrap().remove(session_id);
    }

    pub async fn save(
        &self,
        session_id: &str,
        bytes: &[u8],
        encoding: AudioEncoding,
    ) -> Result<TempArtifact> {
        let artifact = TempArtifact {
            session_id: session_id.to_string(),
            file_name: format!("{}.{}", session_id, encoding.extension()),
            size_bytes: bytes.len() as u64,
            created_at: Utc::now(),
            encoding,
        };

        self.files.write(&artifact.path(), bytes).await?;
        info!(
            "Saved temp artifact: {} ({} bytes)",
            artifact.file_name, artifact.size_bytes
        );

        self.index
            .lock()
            .unwrap()
            .insert(session_id.to_string(), artifact.clone());

        Ok(artifact)
    }

    pub async fn read(&self, artifact: &TempArtifact) -> Result<Vec<u8>> {
        self.files.read(&artifact.path()).await
    }

    /// Delete the artifact and release its session's sweep protection.
    pub async fn delete(&self, artifact: &TempArtifact) -> Result<()> {
        self.files.delete(&artifact.path()).await?;
        self.index.lock().unwrap().remove(&artifact.session_id);
        self.release(&artifact.session_id);
        debug!("Deleted temp artifact: {}", artifact.file_name);
        Ok(())
    }

    /// Look up a session's artifact: index first, directory prefix scan as
    /// a fallback for artifacts left by a previous process.
    pub async fn find_by_session(&self, session_id: &str) -> Option<TempArtifact> {
        if let Some(artifact) = self.index.lock().unwrap().get(session_id) {
            return Some(artifact.clone());
        }

        let entries = self.files.list(TEMP_DIR).await.ok()?;
        let prefix = format!("{session_id}.");
        entries
            .into_iter()
            .find(|e| e.name.starts_with(&prefix))
            .map(|e| entry_to_artifact(&e.name, e.modified))
    }

    /// Reclaim abandoned artifacts: anything older than `max_age` that no
    /// live session owns. Runs once at process start. Returns how many
    /// files were removed.
    pub async fn sweep_abandoned(&self, max_age: Duration) -> Result<usize> {
        let entries = self.files.list(TEMP_DIR).await?;
        let now = Utc::now();
        let mut removed = 0;

        for entry in entries {
            let artifact = entry_to_artifact(&entry.name, entry.modified);

            if self.owned.lock().unwrap().contains(&artifact.session_id) {
                continue;
            }
            if now - entry.modified <= max_age {
                continue;
            }

            match self.files.delete(&artifact.path()).await {
                Ok(()) => {
                    self.index.lock().unwrap().remove(&artifact.session_id);
                    removed += 1;
                }
                Err(err) => {
                    // Best-effort: a file we cannot remove now will be seen
                    // by the next sweep
                    warn!("Failed to sweep temp artifact {}: {err:#}", entry.name);
                }
            }
        }

        if removed > 0 {
            info!("Startup sweep removed {removed} abandoned temp artifact(s)");
        }

        Ok(removed)
    }
}

fn entry_to_artifact(name: &str, modified: DateTime<Utc>) -> TempArtifact {
    let (session_id, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), ext),
        None => (name.to_string(), ""),
    };
    let encoding = match ext {
        "mp3" => AudioEncoding::Mp3,
        "m4a" => AudioEncoding::M4a,
        "ogg" => AudioEncoding::Ogg,
        "flac" => AudioEncoding::Flac,
        _ => AudioEncoding::Wav,
    };
    TempArtifact {
        session_id,
        file_name: name.to_string(),
        size_bytes: 0,
        created_at: modified,
        encoding,
    }
}
