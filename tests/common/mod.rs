// Shared fakes and fixtures for the integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use murmur::audio::format::{encode_wav, DecodedAudio};
use murmur::{
    AudioEncoding, AudioStream, CaptureError, MicrophoneCapture, ModelHandle, Note, SpeechModel,
    TranscriptionStatus,
};

/// 16kHz mono WAV of the given length, with a quiet ramp so it is not
/// all-zero data.
pub fn wav_bytes(duration_secs: f64) -> Vec<u8> {
    let sample_rate = 16000;
    let count = (duration_secs * sample_rate as f64) as usize;
    let samples: Vec<i16> = (0..count).map(|i| ((i % 200) as i16 - 100) * 50).collect();
    encode_wav(&DecodedAudio {
        samples,
        sample_rate,
        channels: 1,
    })
    .expect("encode test WAV")
}

/// Silent MPEG-1 Layer III mono frames (128kbps, 44.1kHz): a minimal but
/// decodable legacy-format file.
pub fn silent_mp3(frames: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(frames * 417);
    for _ in 0..frames {
        let mut frame = vec![0u8; 417];
        frame[0] = 0xFF;
        frame[1] = 0xFB;
        frame[2] = 0x90;
        frame[3] = 0xC0;
        out.extend_from_slice(&frame);
    }
    out
}

/// Bytes that sniff as MP3 but cannot decode
pub fn corrupt_mp3() -> Vec<u8> {
    let mut out = vec![0xFF, 0xFB, 0x90, 0xC0];
    out.extend_from_slice(b"this is definitely not mpeg audio data, not even close");
    out
}

/// A note row for repository-level tests
pub fn sample_note(id: &str, title: &str, created_at: DateTime<Utc>) -> Note {
    Note {
        id: id.to_string(),
        title: title.to_string(),
        transcript: String::new(),
        duration_secs: 1.0,
        created_at,
        audio_file: format!("{id}.wav"),
        audio_ready: true,
        transcription_status: TranscriptionStatus::Pending,
        transcription_error: None,
        transcription_retries: 0,
        transcription_generation: 0,
    }
}

/// Microphone fake that plays back scripted chunks.
///
/// All chunks are queued when the stream opens; the channel stays open
/// until `close`, mirroring a device that keeps capturing until told to
/// stop.
pub struct ScriptedMicrophone {
    permission: bool,
    permission_delay: Duration,
    fail_open: bool,
    encoding: AudioEncoding,
    chunks: Vec<Vec<u8>>,
    sender: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
}

impl ScriptedMicrophone {
    pub fn granting(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            permission: true,
            permission_delay: Duration::ZERO,
            fail_open: false,
            encoding: AudioEncoding::Wav,
            chunks,
            sender: Mutex::new(None),
        }
    }

    pub fn denying() -> Self {
        Self {
            permission: false,
            ..Self::granting(Vec::new())
        }
    }

    pub fn unavailable() -> Self {
        Self {
            fail_open: true,
            ..Self::granting(Vec::new())
        }
    }

    /// Simulate a slow permission prompt
    pub fn with_permission_delay(mut self, delay: Duration) -> Self {
        self.permission_delay = delay;
        self
    }

    /// Pretend the device negotiated a different encoding
    pub fn with_encoding(mut self, encoding: AudioEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

#[async_trait::async_trait]
impl MicrophoneCapture for ScriptedMicrophone {
    async fn request_permission(&self) -> bool {
        if !self.permission_delay.is_zero() {
            tokio::time::sleep(self.permission_delay).await;
        }
        self.permission
    }

    async fn open(&self) -> Result<AudioStream, CaptureError> {
        if self.fail_open {
            return Err(CaptureError::DeviceUnavailable(
                "no input device".to_string(),
            ));
        }

        let (tx, rx) = mpsc::channel(self.chunks.len().max(1));
        for chunk in &self.chunks {
            tx.send(chunk.clone()).await.expect("queue scripted chunk");
        }
        *self.sender.lock().unwrap() = Some(tx);

        Ok(AudioStream {
            encoding: self.encoding,
            chunks: rx,
        })
    }

    async fn close(&self) {
        // Dropping the sender ends the stream
        self.sender.lock().unwrap().take();
    }
}

/// Speech model fake with scriptable load/run behavior
pub struct FakeSpeechModel {
    text: String,
    fail_loads: usize,
    fail_run: bool,
    load_delay: Duration,
    run_delay: Duration,
    pub load_calls: Arc<AtomicUsize>,
    pub run_calls: Arc<AtomicUsize>,
}

impl FakeSpeechModel {
    pub fn returning(text: &str) -> Self {
        Self {
            text: text.to_string(),
            fail_loads: 0,
            fail_run: false,
            load_delay: Duration::ZERO,
            run_delay: Duration::ZERO,
            load_calls: Arc::new(AtomicUsize::new(0)),
            run_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail the first `count` load attempts, succeed afterwards
    pub fn failing_loads(mut self, count: usize) -> Self {
        self.fail_loads = count;
        self
    }

    pub fn failing_run(mut self) -> Self {
        self.fail_run = true;
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn with_run_delay(mut self, delay: Duration) -> Self {
        self.run_delay = delay;
        self
    }
}

#[async_trait::async_trait]
impl SpeechModel for FakeSpeechModel {
    async fn load(&self) -> Result<ModelHandle> {
        let call = self.load_calls.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        if call < self.fail_loads {
            anyhow::bail!("model download failed: connection reset");
        }
        Ok(ModelHandle {
            key: "fake-model".to_string(),
            path: PathBuf::from("fake-model.bin"),
        })
    }

    async fn run(&self, _handle: &ModelHandle, _audio: &[u8]) -> Result<String> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        if !self.run_delay.is_zero() {
            tokio::time::sleep(self.run_delay).await;
        }
        if self.fail_run {
            anyhow::bail!("inference failed: bad audio window");
        }
        Ok(self.text.clone())
    }
}

/// Poll until `check` passes or the deadline expires
pub async fn wait_until<F>(mut check: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
