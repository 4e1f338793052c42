use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::session::{AudioCaptureSession, SessionHandle};
use crate::audio::CaptureError;
use crate::note::Note;
use crate::store::promote::{CommitRequest, PromotionPipeline};
use crate::store::temp::{TempArtifact, TempArtifactStore};
use crate::transcribe::TranscriptionOrchestrator;

/// Top-level state of a recording flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingPhase {
    Idle,
    PermissionCheck,
    Recording,
    Finalizing,
    Committed,
    Discarded,
}

/// App-lifecycle signal consumed by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppLifecycleEvent {
    EnteredBackground,
    EnteredForeground,
}

struct PendingCommit {
    artifact: TempArtifact,
    /// Duration shown while the title prompt is open, frozen at stop time.
    /// The committed duration comes from the decoded audio, not this.
    stopped_duration: f64,
}

struct ControllerState {
    phase: RecordingPhase,
    handle: Option<SessionHandle>,
    pending: Option<PendingCommit>,
    /// Set when a background transition commits the pending recording.
    /// Reset only when a new recording starts, so the auto-save can fire
    /// at most once per recording.
    auto_saved: bool,
}

/// Sequences one recording from permission check through capture to commit
/// or discard, and reacts to app background/foreground transitions.
///
/// The active session is an owned field here, not ambient state: the
/// controller is the single place that knows whether a recording exists
/// and what should happen to it next.
pub struct RecordingLifecycleController {
    capture: Arc<AudioCaptureSession>,
    promoter: Arc<PromotionPipeline>,
    orchestrator: TranscriptionOrchestrator,
    temp: Arc<TempArtifactStore>,
    state: Mutex<ControllerState>,
}

impl RecordingLifecycleController {
    pub fn new(
        capture: Arc<AudioCaptureSession>,
        promoter: Arc<PromotionPipeline>,
        orchestrator: TranscriptionOrchestrator,
        temp: Arc<TempArtifactStore>,
    ) -> Self {
        Self {
            capture,
            promoter,
            orchestrator,
            temp,
            state: Mutex::new(ControllerState {
                phase: RecordingPhase::Idle,
                handle: None,
                pending: None,
                auto_saved: false,
            }),
        }
    }

    pub async fn phase(&self) -> RecordingPhase {
        self.state.lock().await.phase
    }

    /// Live duration while recording; frozen at the stopped value while a
    /// commit is awaited.
    pub async fn elapsed(&self) -> Option<f64> {
        let state = self.state.lock().await;
        match state.phase {
            RecordingPhase::Recording => self.capture.elapsed().await,
            RecordingPhase::Finalizing => state.pending.as_ref().map(|p| p.stopped_duration),
            _ => None,
        }
    }

    pub async fn begin_recording(&self) -> Result<(), CaptureError> {
        let mut state = self.state.lock().await;
        if state.handle.is_some() || state.pending.is_some() {
            return Err(CaptureError::SessionAlreadyActive);
        }

        state.phase = RecordingPhase::PermissionCheck;
        state.auto_saved = false;

        match self.capture.start().await {
            Ok(handle) => {
                state.handle = Some(handle);
                state.phase = RecordingPhase::Recording;
                Ok(())
            }
            Err(err) => {
                state.phase = RecordingPhase::Idle;
                Err(err)
            }
        }
    }

    /// Stop capturing. The recording is not yet a note; it waits in
    /// `finalizing` for a title (or for the auto-save rule to fire).
    /// Returns the frozen duration for display.
    pub async fn stop_recording(&self) -> Result<f64, CaptureError> {
        let mut state = self.state.lock().await;
        let handle = state.handle.take().ok_or(CaptureError::NoActiveSession)?;

        let stopped_duration = self.capture.elapsed().await.unwrap_or(0.0);

        match self.capture.stop(handle).await {
            Ok(artifact) => {
                state.pending = Some(PendingCommit {
                    artifact,
                    stopped_duration,
                });
                state.phase = RecordingPhase::Finalizing;
                Ok(stopped_duration)
            }
            Err(err) => {
                state.phase = RecordingPhase::Idle;
                Err(err)
            }
        }
    }

    /// Commit the stopped recording as a note, with the user's title or a
    /// timestamp-derived default, and kick off transcription.
    pub async fn commit(&self, title: Option<String>) -> Result<Note> {
        let mut state = self.state.lock().await;
        let title = title.unwrap_or_else(|| Note::default_title(Utc::now()));
        self.commit_pending(&mut state, title).await
    }

    /// Abandon the current recording or the stopped-but-uncommitted
    /// artifact. An auto-saved recording can no longer be discarded; its
    /// artifact was already consumed by the commit.
    pub async fn discard(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        if let Some(handle) = state.handle.take() {
            self.capture.discard(handle).await;
            state.phase = RecordingPhase::Discarded;
            return Ok(());
        }

        if let Some(pending) = state.pending.take() {
            if let Err(err) = self.temp.delete(&pending.artifact).await {
                warn!("Failed to delete discarded artifact: {err:#}");
            }
            state.phase = RecordingPhase::Discarded;
            return Ok(());
        }

        bail!("No recording to discard")
    }

    /// Delete a committed note: any in-flight transcription is cancelled,
    /// then audio bytes go before the repository row.
    pub async fn delete_note(&self, note_id: &str) -> Result<()> {
        self.orchestrator.cancel_for(note_id).await;
        self.promoter.remove(note_id).await
    }

    pub async fn handle_event(&self, event: AppLifecycleEvent) {
        match event {
            AppLifecycleEvent::EnteredBackground => self.auto_save().await,
            AppLifecycleEvent::EnteredForeground => {}
        }
    }

    /// Drive the controller from an app-lifecycle signal channel
    pub fn run_events(
        self: Arc<Self>,
        mut events: mpsc::Receiver<AppLifecycleEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.handle_event(event).await;
            }
        })
    }

    /// Backgrounded while a stopped recording awaits its title: commit it
    /// now with a generated title rather than risk losing it if the
    /// process is terminated. Runs at most once per recording.
    async fn auto_save(&self) {
        let mut state = self.state.lock().await;
        if state.phase != RecordingPhase::Finalizing || state.auto_saved {
            return;
        }

        // Consume the flag before attempting the commit; even a failed
        // attempt must not run twice
        state.auto_saved = true;

        let title = Note::default_title(Utc::now());
        match self.commit_pending(&mut state, title).await {
            Ok(note) => info!("Auto-saved note {} on background transition", note.id),
            Err(err) => error!("Auto-save failed: {err:#}"),
        }
    }

    async fn commit_pending(
        &self,
        state: &mut ControllerState,
        title: String,
    ) -> Result<Note> {
        let pending = state
            .pending
            .take()
            .context("No recording awaiting commit")?;

        match self
            .promoter
            .commit(&pending.artifact, CommitRequest { title })
            .await
        {
            Ok(note) => {
                state.phase = RecordingPhase::Committed;
                // Transcription is best-effort and never fails the commit
                if let Err(err) = self.orchestrator.start_for(&note.id).await {
                    warn!("Failed to start transcription for note {}: {err:#}", note.id);
                }
                Ok(note)
            }
            Err(err) => {
                // Keep the artifact so the user can retry or discard;
                // integrity failures intentionally leave the temp file
                state.pending = Some(pending);
                Err(err.into())
            }
        }
    }
}
