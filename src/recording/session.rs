use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audio::{AudioEncoding, CaptureError, MicrophoneCapture};
use crate::store::temp::{TempArtifact, TempArtifactStore};

/// Capture-level state of the current recording attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Acquiring,
    Recording,
    Stopping,
    Finalized,
    Discarded,
}

/// Proof of ownership of the active session. Not cloneable: whoever holds
/// the handle is the only caller who can stop or discard the recording.
#[derive(Debug)]
pub struct SessionHandle {
    session_id: String,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

struct ActiveCapture {
    session_id: String,
    /// When the capture stream actually opened (permission-prompt latency
    /// never counts toward the recorded duration)
    started_at: Instant,
    encoding: AudioEncoding,
    /// Accumulates encoded chunks until the stream closes
    pump: JoinHandle<Vec<u8>>,
}

/// One recording attempt at a time: acquires the microphone, accumulates
/// encoded audio, and finalizes into a temp artifact on stop.
pub struct AudioCaptureSession {
    mic: Arc<dyn MicrophoneCapture>,
    temp: Arc<TempArtifactStore>,
    active: Mutex<Option<ActiveCapture>>,
    state: std::sync::Mutex<CaptureState>,
}

impl AudioCaptureSession {
    pub fn new(mic: Arc<dyn MicrophoneCapture>, temp: Arc<TempArtifactStore>) -> Self {
        Self {
            mic,
            temp,
            active: Mutex::new(None),
            state: std::sync::Mutex::new(CaptureState::Idle),
        }
    }

    /// Observable capture state, for display
    pub fn state(&self) -> CaptureState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: CaptureState) {
        *self.state.lock().unwrap() = state;
    }

    /// Start a recording. Requests microphone permission first if needed;
    /// fails with `SessionAlreadyActive` rather than replacing an
    /// in-progress recording.
    pub async fn start(&self) -> Result<SessionHandle, CaptureError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(CaptureError::SessionAlreadyActive);
        }

        let session_id = Uuid::new_v4().to_string();

        // Own the temp slot before any capture exists so the startup sweep
        // can never consider this session's artifact.
        self.temp.claim(&session_id);
        self.set_state(CaptureState::Acquiring);

        if !self.mic.request_permission().await {
            self.temp.release(&session_id);
            self.set_state(CaptureState::Idle);
            return Err(CaptureError::PermissionDenied);
        }

        let stream = match self.mic.open().await {
            Ok(stream) => stream,
            Err(err) => {
                self.temp.release(&session_id);
                self.set_state(CaptureState::Idle);
                return Err(err);
            }
        };

        // The stream is live from here; duration counts from this instant
        let started_at = Instant::now();
        let mut chunks = stream.chunks;
        let pump = tokio::spawn(async move {
            let mut buffer = Vec::new();
            while let Some(chunk) = chunks.recv().await {
                buffer.extend_from_slice(&chunk);
            }
            buffer
        });

        info!("Recording session started: {session_id}");
        self.set_state(CaptureState::Recording);
        *active = Some(ActiveCapture {
            session_id: session_id.clone(),
            started_at,
            encoding: stream.encoding,
            pump,
        });

        Ok(SessionHandle { session_id })
    }

    /// Stop the recording: close the stream, drain the buffer, and write
    /// the temp artifact.
    pub async fn stop(&self, handle: SessionHandle) -> Result<TempArtifact, CaptureError> {
        let mut active = self.active.lock().await;
        let owned = active
            .as_ref()
            .map(|capture| capture.session_id == handle.session_id)
            .unwrap_or(false);
        if !owned {
            return Err(CaptureError::NoActiveSession);
        }
        let capture = active.take().unwrap();

        self.set_state(CaptureState::Stopping);
        self.mic.close().await;

        let bytes = capture
            .pump
            .await
            .map_err(|err| CaptureError::Storage(format!("capture task failed: {err}")))?;
        let duration = capture.started_at.elapsed().as_secs_f64();

        let artifact = match self
            .temp
            .save(&capture.session_id, &bytes, capture.encoding)
            .await
        {
            Ok(artifact) => artifact,
            Err(err) => {
                self.temp.release(&capture.session_id);
                self.set_state(CaptureState::Idle);
                return Err(CaptureError::Storage(format!("{err:#}")));
            }
        };

        info!(
            "Recording finalized: {} ({:.1}s, {} bytes)",
            capture.session_id, duration, artifact.size_bytes
        );
        self.set_state(CaptureState::Finalized);

        Ok(artifact)
    }

    /// Abandon the recording. Best-effort: capture stops, any written
    /// artifact is deleted, and nothing here can fail the caller.
    pub async fn discard(&self, handle: SessionHandle) {
        let mut active = self.active.lock().await;
        let owned = active
            .as_ref()
            .map(|capture| capture.session_id == handle.session_id)
            .unwrap_or(false);
        if !owned {
            return;
        }
        let capture = active.take().unwrap();

        self.mic.close().await;
        capture.pump.abort();

        if let Some(artifact) = self.temp.find_by_session(&capture.session_id).await {
            if let Err(err) = self.temp.delete(&artifact).await {
                warn!(
                    "Failed to delete discarded artifact {}: {err:#}",
                    artifact.file_name
                );
            }
        }
        self.temp.release(&capture.session_id);

        info!("Recording session discarded: {}", capture.session_id);
        self.set_state(CaptureState::Discarded);
    }

    /// Seconds since capture actually began, while a session is active
    pub async fn elapsed(&self) -> Option<f64> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|capture| capture.started_at.elapsed().as_secs_f64())
    }
}
