use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::engine::{TranscribeError, TranscriptionEngine};
use super::model::CancelToken;
use crate::note::Note;
use crate::store::fs::FileStore;
use crate::store::promote::audio_path;
use crate::store::repository::NoteRepository;

struct ActiveTask {
    generation: u64,
    token: CancelToken,
}

/// Binds committed notes to transcription work.
///
/// At most one un-cancelled task per note: starting a new task cancels the
/// previous one, and every result is applied through a generation-guarded
/// repository write, so a stale task can never clobber a newer one's
/// transcript. Transcription outcome never affects the note's usability.
#[derive(Clone)]
pub struct TranscriptionOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    engine: TranscriptionEngine,
    repo: Arc<NoteRepository>,
    files: Arc<dyn FileStore>,
    active: Mutex<HashMap<String, ActiveTask>>,
}

impl TranscriptionOrchestrator {
    pub fn new(
        engine: TranscriptionEngine,
        repo: Arc<NoteRepository>,
        files: Arc<dyn FileStore>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                repo,
                files,
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Start (or restart) transcription for a note. Fire-and-forget: the
    /// work runs in a background task and reports back through the
    /// repository's transcription fields.
    pub async fn start_for(&self, note_id: &str) -> Result<()> {
        let note = self
            .inner
            .repo
            .get_by_id(note_id)?
            .with_context(|| format!("No such note: {note_id}"))?;

        let mut active = self.inner.active.lock().await;

        // Starting anew implicitly cancels any prior task for this note
        if let Some(prev) = active.get(note_id) {
            debug!("Superseding transcription task for note {note_id}");
            self.inner.engine.cancel(&prev.token);
        }

        let generation = self
            .inner
            .repo
            .begin_transcription(note_id)?
            .with_context(|| format!("Note vanished before transcription: {note_id}"))?;

        let token = CancelToken::new();
        active.insert(
            note_id.to_string(),
            ActiveTask {
                generation,
                token: token.clone(),
            },
        );
        drop(active);

        info!("Transcription task started for note {note_id} (generation {generation})");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.run_task(note, generation, token).await });

        Ok(())
    }

    /// Cancel any in-flight task for the note. The task stops writing
    /// results once it observes the flag; the inference call itself is not
    /// forcibly interrupted.
    pub async fn cancel_for(&self, note_id: &str) {
        let active = self.inner.active.lock().await;
        if let Some(task) = active.get(note_id) {
            info!("Cancelling transcription for note {note_id}");
            self.inner.engine.cancel(&task.token);
        }
    }
}

impl Inner {
    async fn run_task(self: Arc<Self>, note: Note, generation: u64, token: CancelToken) {
        let outcome = self.transcribe_note(&note, &token).await;

        let applied = match &outcome {
            Ok(text) => self.repo.complete_transcription(&note.id, generation, text),
            Err(TranscribeError::Cancelled) => {
                // Cancellation is not a failure; the note goes back to
                // pending and keeps whatever transcript it already had
                self.repo.revert_transcription(&note.id, generation)
            }
            Err(err) => self
                .repo
                .fail_transcription(&note.id, generation, &err.to_string()),
        };

        match applied {
            Ok(true) => match outcome {
                Ok(_) => info!("Transcription completed for note {}", note.id),
                Err(err) => debug!("Transcription ended for note {}: {err}", note.id),
            },
            Ok(false) => debug!(
                "Discarded stale transcription result for note {} (generation {generation})",
                note.id
            ),
            Err(err) => error!(
                "Failed to record transcription outcome for note {}: {err:#}",
                note.id
            ),
        }

        // Drop our bookkeeping entry unless a newer task already replaced it
        let mut active = self.active.lock().await;
        if active.get(&note.id).map(|t| t.generation) == Some(generation) {
            active.remove(&note.id);
        }
    }

    async fn transcribe_note(
        &self,
        note: &Note,
        token: &CancelToken,
    ) -> Result<String, TranscribeError> {
        let audio = self
            .files
            .read(&audio_path(&note.audio_file))
            .await
            .map_err(|err| TranscribeError::Inference(format!("audio unreadable: {err:#}")))?;

        self.engine.transcribe(&audio, token).await
    }
}
