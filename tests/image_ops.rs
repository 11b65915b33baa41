// ABOUTME: Integration tests for local image operations.
// ABOUTME: Tag, remove, existence checks, archive save/load, and mirroring.

mod support;

use imgferry::progress::EventLevel;
use imgferry::runtime::traits::TransferError;
use imgferry::transfer::{CoordinatorErrorKind, TransferCoordinator, TransferSettings};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use support::{MemoryBackend, RecordingSink, TestImage, linux_amd64};

const TIMEOUT: Duration = Duration::from_secs(60);

fn coordinator(
    backend: &Arc<MemoryBackend>,
    sink: &Arc<RecordingSink>,
) -> TransferCoordinator<MemoryBackend> {
    TransferCoordinator::new(
        backend.clone(),
        sink.clone(),
        TransferSettings {
            platform: linux_amd64(),
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn exists_reports_normalized_name() {
    let backend = MemoryBackend::new();
    let sink = RecordingSink::new();
    backend.seed("nginx", &TestImage::new(&linux_amd64(), &[b"x"]));
    let coordinator = coordinator(&backend, &sink);

    assert_eq!(
        coordinator.image_exists("nginx").await.unwrap(),
        ("docker.io/library/nginx:latest".to_string(), true)
    );
    assert_eq!(
        coordinator.image_exists("ghcr.io/org/other:1").await.unwrap(),
        ("ghcr.io/org/other:1".to_string(), false)
    );
}

#[tokio::test]
async fn tag_adds_a_name_and_replaces_existing_target() {
    let backend = MemoryBackend::new();
    let sink = RecordingSink::new();
    let first = TestImage::new(&linux_amd64(), &[b"first"]);
    let second = TestImage::new(&linux_amd64(), &[b"second"]);
    backend.seed("app:v1", &first);
    backend.seed("app:v2", &second);
    let coordinator = coordinator(&backend, &sink);

    coordinator.tag("app:v1", "app:stable").await.unwrap();
    coordinator.tag("app:v2", "app:stable").await.unwrap();

    let records = coordinator.list().await.unwrap();
    let stable = records
        .iter()
        .find(|r| r.name.to_string() == "docker.io/library/app:stable")
        .unwrap();
    assert_eq!(stable.target.digest, second.target.digest);
    assert!(backend.has_image("app:v1"));
    assert!(
        sink.events_at(EventLevel::Info)
            .iter()
            .any(|m| m == "change image tag success")
    );
}

#[tokio::test]
async fn tag_of_missing_source_fails() {
    let backend = MemoryBackend::new();
    let sink = RecordingSink::new();

    let err = coordinator(&backend, &sink)
        .tag("app:nope", "app:stable")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), CoordinatorErrorKind::NotFound);
    assert!(!backend.has_image("app:stable"));
}

#[tokio::test]
async fn remove_deletes_record_and_fails_when_absent() {
    let backend = MemoryBackend::new();
    let sink = RecordingSink::new();
    backend.seed("app:v1", &TestImage::new(&linux_amd64(), &[b"x"]));
    let coordinator = coordinator(&backend, &sink);

    coordinator.remove("app:v1").await.unwrap();
    assert!(!backend.has_image("app:v1"));

    let err = coordinator.remove("app:v1").await.unwrap_err();
    assert_eq!(err.kind(), CoordinatorErrorKind::NotFound);
}

#[tokio::test]
async fn save_then_load_restores_image() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("app.tar");
    let image = TestImage::new(&linux_amd64(), &[b"layer a", b"layer b"]);

    let source = MemoryBackend::new();
    source.seed("registry.example.com/app:v1", &image);
    coordinator(&source, &RecordingSink::new())
        .save("registry.example.com/app:v1", &archive)
        .await
        .unwrap();
    assert!(archive.exists());

    let dest = MemoryBackend::new();
    let names = coordinator(&dest, &RecordingSink::new())
        .load(&archive)
        .await
        .unwrap();

    assert_eq!(names, vec!["registry.example.com/app:v1".to_string()]);
    assert!(dest.has_image("registry.example.com/app:v1"));
    assert_eq!(dest.blob_count(), image.blobs.len());
}

#[tokio::test]
async fn load_of_missing_file_is_an_archive_error() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MemoryBackend::new();
    let sink = RecordingSink::new();

    let err = coordinator(&backend, &sink)
        .load(&dir.path().join("absent.tar"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), CoordinatorErrorKind::Archive);
    assert!(!sink.events_at(EventLevel::Error).is_empty());
}

#[tokio::test(start_paused = true)]
async fn mirror_pulls_retags_and_pushes_when_source_absent() {
    let backend = MemoryBackend::new();
    let sink = RecordingSink::new();
    let image = TestImage::new(&linux_amd64(), &[b"x"]);
    backend.publish("docker.io/library/redis:7", &image);

    coordinator(&backend, &sink)
        .mirror("registry.example.com/mirror/redis:7", "redis:7", None, TIMEOUT)
        .await
        .unwrap();

    assert!(backend.has_image("registry.example.com/mirror/redis:7"));
    let pushed = backend.pushed();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].0, "registry.example.com/mirror/redis:7");
    assert_eq!(pushed[0].1.digest, image.target.digest);
}

#[tokio::test(start_paused = true)]
async fn mirror_skips_when_source_present() {
    let backend = MemoryBackend::new();
    let sink = RecordingSink::new();
    backend.seed("registry.example.com/mirror/redis:7", &TestImage::new(&linux_amd64(), &[b"x"]));

    coordinator(&backend, &sink)
        .mirror("registry.example.com/mirror/redis:7", "redis:7", None, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(backend.pull_calls.load(Ordering::SeqCst), 0);
    assert_eq!(backend.push_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn mirror_reports_the_failing_step() {
    let backend = MemoryBackend::new();
    let sink = RecordingSink::new();
    backend.publish("redis:7", &TestImage::new(&linux_amd64(), &[b"x"]));
    backend.fail_pushes((0..3).map(|_| TransferError::Unauthorized("registry.example.com".into())));

    let err = coordinator(&backend, &sink)
        .mirror("registry.example.com/mirror/redis:7", "redis:7", None, TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(err.attempts(), Some(3));
    let mirror_errors: Vec<_> = sink
        .events()
        .into_iter()
        .filter(|(level, step, _)| *level == EventLevel::Error && step == "mirrorimage")
        .collect();
    assert_eq!(mirror_errors.len(), 1);
    assert!(mirror_errors[0].2.starts_with("push image registry.example.com/mirror/redis:7 failed"));
}
