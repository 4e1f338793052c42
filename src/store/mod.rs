//! Durable storage: the filesystem collaborator, temporary recording
//! artifacts, the committed-note repository, and the promotion pipeline
//! that moves bytes from one to the other.

pub mod fs;
pub mod promote;
pub mod repository;
pub mod temp;

pub use fs::{FileEntry, FileStore, LocalFileStore};
pub use promote::{audio_path, CommitError, CommitRequest, PromotionPipeline, AUDIO_DIR};
pub use repository::NoteRepository;
pub use temp::{TempArtifact, TempArtifactStore, TEMP_DIR};
