use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::audio::{format, AudioEncoding};
use crate::note::{Note, NoteUpdate};
use crate::store::fs::FileStore;
use crate::store::promote::audio_path;
use crate::store::repository::NoteRepository;

/// Reported after each note so a caller can render a progress bar
#[derive(Debug, Clone)]
pub struct MigrationProgress {
    pub completed: usize,
    pub total: usize,
    pub current_title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationFailure {
    pub note_id: String,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
pub struct MigrationReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<MigrationFailure>,
}

/// Batch job that re-encodes legacy-format audio to canonical WAV and
/// repoints the repository.
///
/// One note failing never aborts the batch; the repository is only
/// repointed for notes whose re-encoded file passed the same integrity
/// check promotion uses. Cancellation granularity is the note boundary.
pub struct FormatMigrator {
    repo: Arc<NoteRepository>,
    files: Arc<dyn FileStore>,
}

impl FormatMigrator {
    pub fn new(repo: Arc<NoteRepository>, files: Arc<dyn FileStore>) -> Self {
        Self { repo, files }
    }

    /// Count notes whose stored bytes carry a non-canonical audio
    /// signature. The stored file name is ignored; only the sniff counts.
    pub async fn scan_for_legacy_audio(&self) -> Result<usize> {
        Ok(self.legacy_notes().await?.len())
    }

    /// Migrate every legacy note. `on_progress` is called after each note
    /// and returns whether to keep going, so a caller can stop the batch
    /// at a note boundary (there is no mid-file cancellation).
    pub async fn migrate_all<F>(&self, mut on_progress: F) -> Result<MigrationReport>
    where
        F: FnMut(MigrationProgress) -> bool + Send,
    {
        let legacy = self.legacy_notes().await?;
        let total = legacy.len();
        let mut report = MigrationReport::default();

        info!("Migrating {total} legacy audio file(s)");

        for (index, note) in legacy.into_iter().enumerate() {
            match self.migrate_one(&note).await {
                Ok(()) => report.succeeded.push(note.id.clone()),
                Err(err) => {
                    warn!("Migration failed for note {}: {err:#}", note.id);
                    report.failed.push(MigrationFailure {
                        note_id: note.id.clone(),
                        reason: format!("{err:#}"),
                    });
                }
            }

            let keep_going = on_progress(MigrationProgress {
                completed: index + 1,
                total,
                current_title: note.title.clone(),
            });
            if !keep_going {
                info!("Migration stopped by caller after {} note(s)", index + 1);
                break;
            }
        }

        info!(
            "Migration finished: {} succeeded, {} failed",
            report.succeeded.len(),
            report.failed.len()
        );

        Ok(report)
    }

    async fn legacy_notes(&self) -> Result<Vec<Note>> {
        let mut legacy = Vec::new();
        for note in self.repo.get_all()? {
            let Ok(bytes) = self.files.read(&audio_path(&note.audio_file)).await else {
                continue;
            };
            match format::detect(&bytes) {
                Some(encoding) if encoding != AudioEncoding::CANONICAL => legacy.push(note),
                _ => {}
            }
        }
        Ok(legacy)
    }

    async fn migrate_one(&self, note: &Note) -> Result<()> {
        let old_path = audio_path(&note.audio_file);
        let bytes = self.files.read(&old_path).await?;

        let decoded = format::decode(&bytes).context("Legacy audio failed to decode")?;
        let wav = format::encode_wav(&decoded)?;

        let new_file = format!("{}.wav", note.id);
        let new_path = audio_path(&new_file);
        self.files.write(&new_path, &wav).await?;

        // Same integrity bar as promotion before the repository is touched
        let written = self.files.read(&new_path).await?;
        if format::detect(&written) != Some(AudioEncoding::Wav) {
            let _ = self.files.delete(&new_path).await;
            bail!("Re-encoded file failed signature check");
        }
        if let Err(err) = format::decode(&written) {
            let _ = self.files.delete(&new_path).await;
            bail!("Re-encoded file failed to decode: {err:#}");
        }

        self.repo.update(
            &note.id,
            NoteUpdate {
                audio_file: Some(new_file),
                ..Default::default()
            },
        )?;

        // A legacy file named like the canonical one (mismatched extension)
        // was just overwritten in place; there is nothing old to delete.
        if old_path != new_path {
            if let Err(err) = self.files.delete(&old_path).await {
                warn!("Failed to delete legacy audio {old_path}: {err:#}");
            }
        }

        info!("Migrated note {} to canonical format", note.id);
        Ok(())
    }
}
