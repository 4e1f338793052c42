use thiserror::Error;
use tokio::sync::mpsc;

/// Audio container/codec identifier.
///
/// WAV is the canonical on-disk format; everything else is a legacy or
/// device-negotiated encoding that the migrator eventually normalizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioEncoding {
    Wav,
    Mp3,
    M4a,
    Ogg,
    Flac,
}

impl AudioEncoding {
    /// Canonical extension for files of this encoding
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
            Self::Ogg => "ogg",
            Self::Flac => "flac",
        }
    }

    pub const CANONICAL: AudioEncoding = AudioEncoding::Wav;
}

/// Errors surfaced by capture operations
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("audio capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("a recording session is already active")]
    SessionAlreadyActive,

    #[error("no active recording session")]
    NoActiveSession,

    #[error("failed to store recording: {0}")]
    Storage(String),
}

/// An open capture stream: the encoding the device negotiated plus a
/// channel of encoded audio chunks. The channel closes when the
/// microphone is closed.
pub struct AudioStream {
    pub encoding: AudioEncoding,
    pub chunks: mpsc::Receiver<Vec<u8>>,
}

/// OS-level microphone capture, injected into the capture session.
///
/// Implementations wrap the platform audio API; tests use a scripted fake.
#[async_trait::async_trait]
pub trait MicrophoneCapture: Send + Sync {
    /// Ask the OS for microphone permission. Must be cheap when already
    /// granted; prompts the user at most once.
    async fn request_permission(&self) -> bool;

    /// Begin capturing. The returned stream yields encoded chunks until
    /// `close` is called.
    async fn open(&self) -> Result<AudioStream, CaptureError>;

    /// Stop capturing and close the current stream's channel.
    async fn close(&self);
}
