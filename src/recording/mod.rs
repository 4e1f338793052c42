//! Recording flow: the one-at-a-time capture session and the top-level
//! lifecycle controller that sequences capture, promotion, and
//! transcription.

pub mod lifecycle;
pub mod session;

pub use lifecycle::{AppLifecycleEvent, RecordingLifecycleController, RecordingPhase};
pub use session::{AudioCaptureSession, CaptureState, SessionHandle};
