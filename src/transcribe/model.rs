use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handle to a loaded speech model
#[derive(Debug, Clone)]
pub struct ModelHandle {
    /// Model key, as configured
    pub key: String,
    /// Where the weights live on disk
    pub path: PathBuf,
}

/// The on-device speech-inference runtime, injected into the engine.
///
/// `load` is expected to fetch and cache weights as needed; the engine only
/// sequences phases around it and never cares how the bytes arrive. `run`
/// blocks the calling task until inference completes; it is not assumed
/// preemptible, which is why cancellation is checked around it rather than
/// inside it.
#[async_trait::async_trait]
pub trait SpeechModel: Send + Sync {
    async fn load(&self) -> Result<ModelHandle>;

    async fn run(&self, handle: &ModelHandle, audio: &[u8]) -> Result<String>;
}

/// Cooperative cancellation flag for one transcription task.
///
/// A fresh token is minted per task (never reused across restarts of the
/// same note), so cancelling an old task can never clip a new one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
