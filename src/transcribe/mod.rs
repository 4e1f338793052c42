//! Transcription subsystem: the speech-model collaborator interface, the
//! engine that owns the model's phase state machine, and the orchestrator
//! that binds committed notes to transcription tasks.

pub mod engine;
pub mod model;
pub mod orchestrator;

pub use engine::{EngineError, EnginePhase, TranscribeError, TranscriptionEngine};
pub use model::{CancelToken, ModelHandle, SpeechModel};
pub use orchestrator::TranscriptionOrchestrator;
