pub mod audio;
pub mod config;
pub mod migrate;
pub mod note;
pub mod recording;
pub mod store;
pub mod transcribe;

pub use audio::{AudioEncoding, AudioStream, CaptureError, MicrophoneCapture};
pub use config::Config;
pub use migrate::{FormatMigrator, MigrationProgress, MigrationReport};
pub use note::{Note, NoteUpdate, TranscriptionStatus};
pub use recording::{
    AppLifecycleEvent, AudioCaptureSession, CaptureState, RecordingLifecycleController,
    RecordingPhase, SessionHandle,
};
pub use store::{
    CommitError, CommitRequest, FileStore, LocalFileStore, NoteRepository, PromotionPipeline,
    TempArtifact, TempArtifactStore,
};
pub use transcribe::{
    CancelToken, EngineError, EnginePhase, ModelHandle, SpeechModel, TranscribeError,
    TranscriptionEngine, TranscriptionOrchestrator,
};
