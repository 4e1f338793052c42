// Integration tests for temp artifact storage and the startup sweep.

mod common;

use std::sync::Arc;

use chrono::Duration;
use common::wav_bytes;
use filetime::FileTime;
use murmur::{AudioEncoding, LocalFileStore, TempArtifactStore};
use tempfile::TempDir;

fn store() -> (TempDir, Arc<TempArtifactStore>) {
    let dir = TempDir::new().unwrap();
    let files = Arc::new(LocalFileStore::new(dir.path()));
    (dir, Arc::new(TempArtifactStore::new(files)))
}

/// Backdate a temp file's mtime by `secs` seconds
fn backdate(dir: &TempDir, file_name: &str, secs: i64) {
    let path = dir.path().join("temp-audio").join(file_name);
    let mtime = FileTime::from_unix_time(FileTime::now().unix_seconds() - secs, 0);
    filetime::set_file_mtime(&path, mtime).unwrap();
}

#[tokio::test]
async fn save_read_delete_round_trip() {
    let (dir, store) = store();
    let bytes = wav_bytes(0.3);

    let artifact = store
        .save("session-1", &bytes, AudioEncoding::Wav)
        .await
        .unwrap();
    assert_eq!(artifact.file_name, "session-1.wav");
    assert_eq!(artifact.size_bytes, bytes.len() as u64);

    let read_back = store.read(&artifact).await.unwrap();
    assert_eq!(read_back, bytes);

    store.delete(&artifact).await.unwrap();
    assert!(!dir.path().join("temp-audio/session-1.wav").exists());
}

#[tokio::test]
async fn find_by_session_falls_back_to_directory_scan() {
    let dir = TempDir::new().unwrap();
    let files = Arc::new(LocalFileStore::new(dir.path()));

    // One process saves an artifact...
    let first = TempArtifactStore::new(files.clone());
    first
        .save("restarted-session", &wav_bytes(0.2), AudioEncoding::Wav)
        .await
        .unwrap();

    // ...and a fresh process (empty index) still finds it by prefix
    let second = TempArtifactStore::new(files);
    let found = second.find_by_session("restarted-session").await.unwrap();
    assert_eq!(found.file_name, "restarted-session.wav");

    assert!(second.find_by_session("unknown-session").await.is_none());
}

#[tokio::test]
async fn sweep_removes_only_aged_unowned_artifacts() {
    let (dir, store) = store();

    // Two artifacts with no live session, one owned by an active one
    store
        .save("old-a", &wav_bytes(0.2), AudioEncoding::Wav)
        .await
        .unwrap();
    store
        .save("old-b", &wav_bytes(0.2), AudioEncoding::Wav)
        .await
        .unwrap();
    store.claim("fresh");
    store
        .save("fresh", &wav_bytes(0.2), AudioEncoding::Wav)
        .await
        .unwrap();

    backdate(&dir, "old-a.wav", 7200);
    backdate(&dir, "old-b.wav", 7200);

    let removed = store.sweep_abandoned(Duration::seconds(3600)).await.unwrap();

    assert_eq!(removed, 2);
    assert!(!dir.path().join("temp-audio/old-a.wav").exists());
    assert!(!dir.path().join("temp-audio/old-b.wav").exists());
    assert!(dir.path().join("temp-audio/fresh.wav").exists());
}

#[tokio::test]
async fn sweep_never_touches_owned_artifacts_regardless_of_age() {
    let (dir, store) = store();

    store.claim("live-session");
    store
        .save("live-session", &wav_bytes(0.2), AudioEncoding::Wav)
        .await
        .unwrap();
    backdate(&dir, "live-session.wav", 86_400);

    let removed = store.sweep_abandoned(Duration::seconds(3600)).await.unwrap();

    assert_eq!(removed, 0);
    assert!(dir.path().join("temp-audio/live-session.wav").exists());
}

#[tokio::test]
async fn sweep_spares_artifacts_younger_than_max_age() {
    let (dir, store) = store();

    store
        .save("recent", &wav_bytes(0.2), AudioEncoding::Wav)
        .await
        .unwrap();

    let removed = store.sweep_abandoned(Duration::seconds(3600)).await.unwrap();

    assert_eq!(removed, 0);
    assert!(dir.path().join("temp-audio/recent.wav").exists());
}

#[tokio::test]
async fn release_makes_artifact_sweepable() {
    let (dir, store) = store();

    store.claim("done");
    store
        .save("done", &wav_bytes(0.2), AudioEncoding::Wav)
        .await
        .unwrap();
    backdate(&dir, "done.wav", 7200);

    assert_eq!(
        store.sweep_abandoned(Duration::seconds(3600)).await.unwrap(),
        0
    );

    store.release("done");
    assert_eq!(
        store.sweep_abandoned(Duration::seconds(3600)).await.unwrap(),
        1
    );
}
