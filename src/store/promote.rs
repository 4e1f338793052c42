use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audio::format::{self, DecodedAudio};
use crate::note::{Note, TranscriptionStatus};
use crate::store::fs::FileStore;
use crate::store::repository::NoteRepository;
use crate::store::temp::{TempArtifact, TempArtifactStore};

/// Directory (under the file store root) holding committed audio
pub const AUDIO_DIR: &str = "audio";

/// Logical path of a committed note's audio file
pub fn audio_path(file_name: &str) -> String {
    format!("{AUDIO_DIR}/{file_name}")
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("promoted audio failed integrity verification: {0}")]
    IntegrityCheckFailed(String),

    #[error("storage failure during commit: {0}")]
    Storage(String),

    #[error("failed to record committed note: {0}")]
    Repository(String),
}

#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub title: String,
}

/// The only path by which a note becomes visible.
///
/// Ordering is the correctness guarantee: the repository row is inserted
/// only after the permanent copy is written, read back, sniffed, and
/// decoded. A note can therefore never point at a temp or missing file.
pub struct PromotionPipeline {
    files: Arc<dyn FileStore>,
    temp: Arc<TempArtifactStore>,
    repo: Arc<NoteRepository>,
}

impl PromotionPipeline {
    pub fn new(
        files: Arc<dyn FileStore>,
        temp: Arc<TempArtifactStore>,
        repo: Arc<NoteRepository>,
    ) -> Self {
        Self { files, temp, repo }
    }

    pub async fn commit(
        &self,
        artifact: &TempArtifact,
        request: CommitRequest,
    ) -> Result<Note, CommitError> {
        let bytes = self
            .temp
            .read(artifact)
            .await
            .map_err(|err| CommitError::Storage(format!("{err:#}")))?;

        // Sniff the real format from the bytes; the artifact's extension is
        // a hint only and the capture encoder may have negotiated something
        // else entirely.
        let encoding = format::detect(&bytes).ok_or_else(|| {
            CommitError::IntegrityCheckFailed("unrecognized audio signature".to_string())
        })?;

        let note_id = Uuid::new_v4().to_string();
        let audio_file = format!("{note_id}.{}", encoding.extension());
        let path = audio_path(&audio_file);

        self.files
            .write(&path, &bytes)
            .await
            .map_err(|err| CommitError::Storage(format!("{err:#}")))?;

        let decoded = match self.verify(&path).await {
            Ok(decoded) => decoded,
            Err(reason) => {
                // Abort before any repository row exists. The temp artifact
                // stays behind for diagnosis; the sweep reclaims it later.
                if let Err(err) = self.files.delete(&path).await {
                    warn!("Failed to remove unverified audio {path}: {err:#}");
                }
                return Err(CommitError::IntegrityCheckFailed(reason));
            }
        };

        let note = Note {
            id: note_id,
            title: request.title,
            transcript: String::new(),
            duration_secs: decoded.duration_secs(),
            created_at: Utc::now(),
            audio_file,
            audio_ready: true,
            transcription_status: TranscriptionStatus::Pending,
            transcription_error: None,
            transcription_retries: 0,
            transcription_generation: 0,
        };

        if let Err(err) = self.repo.insert(&note) {
            if let Err(cleanup) = self.files.delete(&path).await {
                warn!("Failed to remove audio after insert failure: {cleanup:#}");
            }
            return Err(CommitError::Repository(format!("{err:#}")));
        }

        // Cleanup never fails the commit; an undeleted temp file is just
        // sweep fodder.
        if let Err(err) = self.temp.delete(artifact).await {
            warn!(
                "Failed to delete temp artifact {}: {err:#}",
                artifact.file_name
            );
        }

        info!(
            "Committed note {} ({:.1}s, {})",
            note.id, note.duration_secs, note.audio_file
        );

        Ok(note)
    }

    /// Delete a note: audio bytes first, row only once the bytes are
    /// confirmed gone. A row must never outlive its file's absence, so a
    /// failed audio delete keeps the row and surfaces the error.
    pub async fn remove(&self, note_id: &str) -> Result<()> {
        let note = self
            .repo
            .get_by_id(note_id)?
            .with_context(|| format!("No such note: {note_id}"))?;

        let path = audio_path(&note.audio_file);
        if self.files.exists(&path).await {
            self.files
                .delete(&path)
                .await
                .with_context(|| format!("Failed to delete audio for note {note_id}; note kept"))?;
        }

        self.repo.delete(note_id)?;
        info!("Deleted note {note_id}");
        Ok(())
    }

    async fn verify(&self, path: &str) -> Result<DecodedAudio, String> {
        if !self.files.exists(path).await {
            return Err("permanent file missing after write".to_string());
        }
        let bytes = self
            .files
            .read(path)
            .await
            .map_err(|err| format!("permanent file unreadable: {err:#}"))?;
        if format::detect(&bytes).is_none() {
            return Err("permanent file has no recognizable audio signature".to_string());
        }
        format::decode(&bytes).map_err(|err| format!("permanent file failed to decode: {err:#}"))
    }
}
