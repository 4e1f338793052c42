use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info};

use super::model::{CancelToken, ModelHandle, SpeechModel};

/// Coarse lifecycle state of the speech model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnginePhase {
    Idle,
    Downloading,
    Ready,
    Error,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("speech model failed to load: {0}")]
    ModelLoad(String),
}

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("transcription engine is not ready")]
    EngineNotReady,

    #[error("transcription was cancelled")]
    Cancelled,

    #[error("inference failed: {0}")]
    Inference(String),
}

enum EngineState {
    Idle,
    Downloading,
    Ready(ModelHandle),
    Error(String),
}

impl EngineState {
    fn phase(&self) -> EnginePhase {
        match self {
            Self::Idle => EnginePhase::Idle,
            Self::Downloading => EnginePhase::Downloading,
            Self::Ready(_) => EnginePhase::Ready,
            Self::Error(_) => EnginePhase::Error,
        }
    }
}

/// Owns the model's phase state machine and the transcribe-one-file
/// operation.
///
/// The model is loaded at most once per process lifetime unless a load
/// fails; `error` is sticky until a fresh `initialize` retries it. Phase
/// changes fan out over a broadcast channel with no ordering guarantee
/// between listeners.
#[derive(Clone)]
pub struct TranscriptionEngine {
    inner: Arc<Inner>,
}

struct Inner {
    model: Arc<dyn SpeechModel>,
    state: Mutex<EngineState>,
    phase_tx: broadcast::Sender<EnginePhase>,
}

impl TranscriptionEngine {
    pub fn new(model: Arc<dyn SpeechModel>) -> Self {
        let (phase_tx, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(Inner {
                model,
                state: Mutex::new(EngineState::Idle),
                phase_tx,
            }),
        }
    }

    pub async fn phase(&self) -> EnginePhase {
        self.inner.state.lock().await.phase()
    }

    /// Listen for phase changes. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<EnginePhase> {
        self.inner.phase_tx.subscribe()
    }

    /// Download and load the model, once. Concurrent callers while a
    /// download is in flight (or after `ready`) never trigger a second
    /// download; they all settle on the same outcome. From `error`, a
    /// fresh call retries.
    pub async fn initialize(&self) -> Result<(), EngineError> {
        // Subscribe before inspecting state so a transition between the
        // check and the wait cannot be missed.
        let rx = self.inner.phase_tx.subscribe();

        let claimed = {
            let mut state = self.inner.state.lock().await;
            match &*state {
                EngineState::Ready(_) => return Ok(()),
                EngineState::Downloading => false,
                EngineState::Idle | EngineState::Error(_) => {
                    *state = EngineState::Downloading;
                    true
                }
            }
        };

        if claimed {
            self.inner.emit(EnginePhase::Downloading);
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.download().await });
        }

        self.wait_settled(rx).await
    }

    /// Transcribe one audio file. Waits for the engine to become ready
    /// (triggering initialization from `idle`), but fails fast with
    /// `EngineNotReady` while the phase is `error` — recovering from a
    /// failed download takes an explicit `initialize`.
    ///
    /// Cancellation is cooperative: checked before inference starts and
    /// again after it returns, never mid-inference.
    pub async fn transcribe(
        &self,
        audio: &[u8],
        token: &CancelToken,
    ) -> Result<String, TranscribeError> {
        match self.phase().await {
            EnginePhase::Error => return Err(TranscribeError::EngineNotReady),
            EnginePhase::Ready => {}
            EnginePhase::Idle | EnginePhase::Downloading => {
                self.initialize()
                    .await
                    .map_err(|_| TranscribeError::EngineNotReady)?;
            }
        }

        if token.is_cancelled() {
            return Err(TranscribeError::Cancelled);
        }

        let handle = {
            let state = self.inner.state.lock().await;
            match &*state {
                EngineState::Ready(handle) => handle.clone(),
                _ => return Err(TranscribeError::EngineNotReady),
            }
        };

        let result = self.inner.model.run(&handle, audio).await;

        // A result that arrives after cancellation is discarded, even a
        // successful one.
        if token.is_cancelled() {
            return Err(TranscribeError::Cancelled);
        }

        result.map_err(|err| TranscribeError::Inference(format!("{err:#}")))
    }

    /// Request cooperative cancellation of the task holding `token`
    pub fn cancel(&self, token: &CancelToken) {
        token.cancel();
    }

    async fn wait_settled(
        &self,
        mut rx: broadcast::Receiver<EnginePhase>,
    ) -> Result<(), EngineError> {
        loop {
            match rx.recv().await {
                Ok(EnginePhase::Ready) => return Ok(()),
                Ok(EnginePhase::Error) => {
                    return Err(EngineError::ModelLoad(self.error_message().await))
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => match self.phase().await {
                    EnginePhase::Ready => return Ok(()),
                    EnginePhase::Error => {
                        return Err(EngineError::ModelLoad(self.error_message().await))
                    }
                    _ => continue,
                },
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(EngineError::ModelLoad("engine shut down".to_string()))
                }
            }
        }
    }

    async fn error_message(&self) -> String {
        match &*self.inner.state.lock().await {
            EngineState::Error(message) => message.clone(),
            _ => "model load failed".to_string(),
        }
    }
}

impl Inner {
    fn emit(&self, phase: EnginePhase) {
        // No receivers is fine; phase changes are observable, not durable
        let _ = self.phase_tx.send(phase);
    }

    async fn download(self: Arc<Self>) {
        match self.model.load().await {
            Ok(handle) => {
                info!("Speech model ready: {}", handle.key);
                *self.state.lock().await = EngineState::Ready(handle);
                self.emit(EnginePhase::Ready);
            }
            Err(err) => {
                let message = format!("{err:#}");
                error!("Speech model load failed: {message}");
                *self.state.lock().await = EngineState::Error(message);
                self.emit(EnginePhase::Error);
            }
        }
    }
}
