//! Audio capture interface and format handling.
//!
//! `capture` defines the OS-level microphone collaborator; `format` owns
//! content-based sniffing, decoding, and canonical WAV encoding.

pub mod capture;
pub mod format;

pub use capture::{AudioEncoding, AudioStream, CaptureError, MicrophoneCapture};
pub use format::{decode, detect, encode_wav, DecodedAudio};
