use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A committed voice note.
///
/// A note only exists once its audio has been promoted to permanent storage
/// and verified; the transcription fields fill in later, independently of
/// the note's usability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    /// Unique note identifier, assigned at commit time
    pub id: String,

    /// User-editable title (defaults to a timestamp-derived label)
    pub title: String,

    /// Transcript text, empty until a transcription completes
    pub transcript: String,

    /// Duration in seconds, measured from the decoded audio at commit time
    pub duration_secs: f64,

    /// When the note was committed
    pub created_at: DateTime<Utc>,

    /// File name of the permanent audio file
    pub audio_file: String,

    /// Whether the permanent audio passed verification
    pub audio_ready: bool,

    /// Current transcription state
    pub transcription_status: TranscriptionStatus,

    /// Error message from the last failed transcription attempt
    pub transcription_error: Option<String>,

    /// How many transcription attempts have failed so far
    pub transcription_retries: u32,

    /// Monotonic counter bumped each time a transcription task starts.
    /// A task's result is only applied while its generation is current.
    #[serde(default)]
    pub transcription_generation: u64,
}

impl Note {
    /// Default title for a note committed at `created_at`, used when the
    /// user never confirmed one (e.g. auto-save on background).
    pub fn default_title(created_at: DateTime<Utc>) -> String {
        format!("Voice note {}", created_at.format("%Y-%m-%d %H:%M"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TranscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, &'static str> {
        match value.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err("Unknown transcription status"),
        }
    }
}

/// Partial update for a note. Fields left as `None` are untouched, so a
/// title edit and a transcript completion landing concurrently lose
/// neither write.
#[derive(Debug, Clone, Default)]
pub struct NoteUpdate {
    pub title: Option<String>,
    pub transcript: Option<String>,
    pub audio_file: Option<String>,
    pub audio_ready: Option<bool>,
    pub transcription_status: Option<TranscriptionStatus>,
    /// `Some(None)` clears the stored error
    pub transcription_error: Option<Option<String>>,
}
