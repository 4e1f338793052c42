use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;

use crate::note::{Note, NoteUpdate, TranscriptionStatus};

/// Durable store of committed notes.
///
/// All access goes through one connection behind a mutex, which also
/// serializes writes: a partial `update` is a read-modify-write under the
/// lock, and transcript results land via generation-conditional statements,
/// so concurrent title edits and transcription completions cannot lose
/// each other's fields.
pub struct NoteRepository {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS notes (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    transcript TEXT NOT NULL DEFAULT '',
    duration_secs REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    audio_file TEXT NOT NULL,
    audio_ready INTEGER NOT NULL DEFAULT 0,
    transcription_status TEXT NOT NULL DEFAULT 'pending',
    transcription_error TEXT,
    transcription_retries INTEGER NOT NULL DEFAULT 0,
    transcription_generation INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_notes_created_at ON notes(created_at DESC);";

impl NoteRepository {
    pub fn open(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create storage directory: {}", parent.display())
            })?;
        }

        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open note database: {}", db_path.display()))?;

        conn.execute_batch(SCHEMA)
            .context("Failed to initialize note schema")?;

        info!("Note database ready: {}", db_path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory repository, for tests and throwaway tooling
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn insert(&self, note: &Note) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO notes (
                id, title, transcript, duration_secs, created_at, audio_file,
                audio_ready, transcription_status, transcription_error,
                transcription_retries, transcription_generation
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                note.id,
                note.title,
                note.transcript,
                note.duration_secs,
                note.created_at.to_rfc3339(),
                note.audio_file,
                note.audio_ready as i64,
                note.transcription_status.as_str(),
                note.transcription_error,
                note.transcription_retries,
                note.transcription_generation as i64,
            ],
        )
        .with_context(|| format!("Failed to insert note {}", note.id))?;
        Ok(())
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<Note>> {
        let conn = self.conn.lock().unwrap();
        let note = conn
            .query_row("SELECT * FROM notes WHERE id = ?1", params![id], row_to_note)
            .optional()
            .with_context(|| format!("Failed to load note {id}"))?;
        Ok(note)
    }

    /// All notes, newest first
    pub fn get_all(&self) -> Result<Vec<Note>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM notes ORDER BY created_at DESC")?;
        let notes = stmt
            .query_map([], row_to_note)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to load notes")?;
        Ok(notes)
    }

    /// Case-insensitive substring match over title and transcript, newest
    /// first like `get_all`
    pub fn search(&self, query: &str) -> Result<Vec<Note>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM notes
             WHERE lower(title) LIKE '%' || lower(?1) || '%'
                OR lower(transcript) LIKE '%' || lower(?1) || '%'
             ORDER BY created_at DESC",
        )?;
        let notes = stmt
            .query_map(params![query], row_to_note)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Search query failed")?;
        Ok(notes)
    }

    /// Apply a partial update; `None` fields are left untouched.
    /// Returns the updated note, or `None` if the id is unknown.
    pub fn update(&self, id: &str, update: NoteUpdate) -> Result<Option<Note>> {
        let conn = self.conn.lock().unwrap();

        let Some(mut note) = conn
            .query_row("SELECT * FROM notes WHERE id = ?1", params![id], row_to_note)
            .optional()?
        else {
            return Ok(None);
        };

        if let Some(title) = update.title {
            note.title = title;
        }
        if let Some(transcript) = update.transcript {
            note.transcript = transcript;
        }
        if let Some(audio_file) = update.audio_file {
            note.audio_file = audio_file;
        }
        if let Some(audio_ready) = update.audio_ready {
            note.audio_ready = audio_ready;
        }
        if let Some(status) = update.transcription_status {
            note.transcription_status = status;
        }
        if let Some(error) = update.transcription_error {
            note.transcription_error = error;
        }

        conn.execute(
            "UPDATE notes SET
                title = ?2, transcript = ?3, audio_file = ?4, audio_ready = ?5,
                transcription_status = ?6, transcription_error = ?7
             WHERE id = ?1",
            params![
                id,
                note.title,
                note.transcript,
                note.audio_file,
                note.audio_ready as i64,
                note.transcription_status.as_str(),
                note.transcription_error,
            ],
        )
        .with_context(|| format!("Failed to update note {id}"))?;

        Ok(Some(note))
    }

    /// Remove the row. Callers must have removed the audio bytes first.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute("DELETE FROM notes WHERE id = ?1", params![id])
            .with_context(|| format!("Failed to delete note {id}"))?;
        Ok(changed > 0)
    }

    /// Start a transcription attempt: bump the generation and mark the note
    /// `processing`. Returns the new generation, or `None` for an unknown id.
    pub fn begin_transcription(&self, id: &str) -> Result<Option<u64>> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE notes SET
                transcription_status = 'processing',
                transcription_generation = transcription_generation + 1
             WHERE id = ?1",
            params![id],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let generation: i64 = conn.query_row(
            "SELECT transcription_generation FROM notes WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(Some(generation as u64))
    }

    /// Record a successful transcription iff `generation` is still current.
    /// Returns whether the write was applied (false means a newer task
    /// superseded this one).
    pub fn complete_transcription(&self, id: &str, generation: u64, text: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE notes SET
                transcript = ?3,
                transcription_status = 'completed',
                transcription_error = NULL
             WHERE id = ?1 AND transcription_generation = ?2",
            params![id, generation as i64, text],
        )?;
        Ok(changed > 0)
    }

    /// Record a failed attempt (generation-guarded). Any prior transcript
    /// is preserved.
    pub fn fail_transcription(&self, id: &str, generation: u64, error: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE notes SET
                transcription_status = 'failed',
                transcription_error = ?3,
                transcription_retries = transcription_retries + 1
             WHERE id = ?1 AND transcription_generation = ?2",
            params![id, generation as i64, error],
        )?;
        Ok(changed > 0)
    }

    /// Roll a cancelled attempt back to `pending` (generation-guarded)
    pub fn revert_transcription(&self, id: &str, generation: u64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE notes SET
                transcription_status = 'pending',
                transcription_error = NULL
             WHERE id = ?1 AND transcription_generation = ?2",
            params![id, generation as i64],
        )?;
        Ok(changed > 0)
    }
}

fn row_to_note(row: &Row) -> rusqlite::Result<Note> {
    let created_raw: String = row.get("created_at")?;
    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_raw)
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(err))
        })?
        .with_timezone(&Utc);

    let status_raw: String = row.get("transcription_status")?;
    let transcription_status = TranscriptionStatus::parse(&status_raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, err.into()))?;

    Ok(Note {
        id: row.get("id")?,
        title: row.get("title")?,
        transcript: row.get("transcript")?,
        duration_secs: row.get("duration_secs")?,
        created_at,
        audio_file: row.get("audio_file")?,
        audio_ready: row.get::<_, i64>("audio_ready")? != 0,
        transcription_status,
        transcription_error: row.get("transcription_error")?,
        transcription_retries: row.get("transcription_retries")?,
        transcription_generation: row.get::<_, i64>("transcription_generation")? as u64,
    })
}
