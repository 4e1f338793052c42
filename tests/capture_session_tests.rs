// Integration tests for the one-at-a-time capture session.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{wav_bytes, ScriptedMicrophone};
use murmur::{AudioCaptureSession, CaptureError, LocalFileStore, TempArtifactStore};
use tempfile::TempDir;

fn session_with(mic: ScriptedMicrophone) -> (TempDir, Arc<AudioCaptureSession>) {
    let dir = TempDir::new().unwrap();
    let files = Arc::new(LocalFileStore::new(dir.path()));
    let temp = Arc::new(TempArtifactStore::new(files));
    (dir, Arc::new(AudioCaptureSession::new(Arc::new(mic), temp)))
}

#[tokio::test]
async fn start_stop_produces_temp_artifact() {
    let bytes = wav_bytes(1.0);
    let (_dir, session) = session_with(ScriptedMicrophone::granting(vec![bytes.clone()]));

    let handle = session.start().await.unwrap();
    let artifact = session.stop(handle).await.unwrap();

    assert_eq!(artifact.size_bytes, bytes.len() as u64);
    assert!(artifact.file_name.ends_with(".wav"));
    assert!(artifact.file_name.starts_with(&artifact.session_id));
}

#[tokio::test]
async fn second_start_fails_while_recording() {
    let (_dir, session) = session_with(ScriptedMicrophone::granting(vec![wav_bytes(0.2)]));

    let _handle = session.start().await.unwrap();
    let second = session.start().await;

    assert!(matches!(second, Err(CaptureError::SessionAlreadyActive)));
}

#[tokio::test]
async fn concurrent_starts_yield_exactly_one_session() {
    let (_dir, session) = session_with(ScriptedMicrophone::granting(vec![wav_bytes(0.2)]));

    let (a, b) = tokio::join!(session.start(), session.start());

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one concurrent start may win");
    for result in [a, b] {
        if let Err(err) = result {
            assert!(matches!(err, CaptureError::SessionAlreadyActive));
        }
    }
}

#[tokio::test]
async fn permission_denied_creates_no_state() {
    let (_dir, session) = session_with(ScriptedMicrophone::denying());

    let result = session.start().await;
    assert!(matches!(result, Err(CaptureError::PermissionDenied)));

    // The slot is free again afterwards
    assert!(session.elapsed().await.is_none());
}

#[tokio::test]
async fn device_unavailable_is_surfaced() {
    let (_dir, session) = session_with(ScriptedMicrophone::unavailable());

    let result = session.start().await;
    assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
}

#[tokio::test]
async fn stop_with_foreign_handle_is_no_active_session() {
    let (_dir_a, session_a) = session_with(ScriptedMicrophone::granting(vec![wav_bytes(0.2)]));
    let (_dir_b, session_b) = session_with(ScriptedMicrophone::granting(vec![wav_bytes(0.2)]));

    let handle = session_a.start().await.unwrap();
    let result = session_b.stop(handle).await;

    assert!(matches!(result, Err(CaptureError::NoActiveSession)));
}

#[tokio::test]
async fn permission_prompt_latency_does_not_inflate_duration() {
    let mic = ScriptedMicrophone::granting(vec![wav_bytes(0.2)])
        .with_permission_delay(Duration::from_millis(300));
    let (_dir, session) = session_with(mic);

    let handle = session.start().await.unwrap();
    let elapsed = session.elapsed().await.unwrap();
    assert!(
        elapsed < 0.25,
        "duration must start when capture begins, got {elapsed}"
    );

    session.stop(handle).await.unwrap();
}

#[tokio::test]
async fn discard_removes_artifact_and_frees_slot() {
    let (dir, session) = session_with(ScriptedMicrophone::granting(vec![wav_bytes(0.2)]));

    let handle = session.start().await.unwrap();
    session.discard(handle).await;

    // No temp files left behind
    let temp_dir = dir.path().join("temp-audio");
    let leftovers = std::fs::read_dir(&temp_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);

    // And a new recording can start
    assert!(session.start().await.is_ok());
}
