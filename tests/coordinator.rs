// ABOUTME: Integration tests for pull and push orchestration.
// ABOUTME: Retry counts, backoff timing, platform fallback, and progress lifecycle.

mod support;

use imgferry::progress::{EventLevel, TransferState};
use imgferry::runtime::traits::TransferError;
use imgferry::transfer::{
    CoordinatorError, CoordinatorErrorKind, RetryPolicy, TransferCoordinator, TransferSettings,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use support::{MemoryBackend, RecordingSink, TestImage, linux_amd64, linux_arm64};
use tokio_util::sync::CancellationToken;

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

fn network_error() -> TransferError {
    TransferError::Network("connection reset".to_string())
}

mod pull {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn returns_image_config_and_finishes_progress() {
        support::init_tracing();
        let backend = MemoryBackend::new();
        let sink = RecordingSink::new();
        let image = TestImage::new(&linux_amd64(), &[b"one", b"two"]);
        backend.publish("registry.example.com/app:v1", &image);

        let config = coordinator(&backend, &sink)
            .pull("registry.example.com/app:v1", None, TIMEOUT)
            .await
            .unwrap();

        assert_eq!(config.cmd, vec!["sh".to_string()]);
        assert_eq!(config.working_dir.as_deref(), Some("/app"));
        assert!(backend.has_image("registry.example.com/app:v1"));

        let last = sink.last_render().unwrap();
        assert_eq!(last[0].key, "registry.example.com/app:v1");
        assert_eq!(last.len(), 1 + image.blobs.len());
        assert!(last.iter().all(|r| r.state.is_terminal()), "{last:?}");
        let info = sink.events_at(EventLevel::Info);
        assert!(info.iter().any(|m| m == "pulling image registry.example.com/app:v1"));
        assert!(info.iter().any(|m| m == "pulled image registry.example.com/app:v1"));
    }

    #[tokio::test(start_paused = true)]
    async fn picks_config_for_configured_platform() {
        let backend = MemoryBackend::new();
        let sink = RecordingSink::new();
        let amd = TestImage::new(&linux_amd64(), &[b"amd"]);
        let arm = TestImage::new(&linux_arm64(), &[b"arm"]);
        let index = TestImage::index(&[(linux_arm64(), arm), (linux_amd64(), amd)]);
        backend.publish("ghcr.io/org/multi:1", &index);

        let config = coordinator(&backend, &sink)
            .pull("ghcr.io/org/multi:1", None, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(config.env, vec!["PATH=/usr/local/bin:/usr/bin".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_not_retried_and_is_reported() {
        let backend = MemoryBackend::new();
        let sink = RecordingSink::new();

        let err = coordinator(&backend, &sink)
            .pull("registry.example.com/missing:v1", None, TIMEOUT)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), CoordinatorErrorKind::Transfer);
        assert_eq!(backend.pull_calls.load(Ordering::SeqCst), 1);
        let errors = sink.events_at(EventLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("pull image registry.example.com/missing:v1 failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_reference_is_rejected_before_any_transfer() {
        let backend = MemoryBackend::new();
        let sink = RecordingSink::new();

        let err = coordinator(&backend, &sink)
            .pull("Registry.Example.com/App", None, TIMEOUT)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), CoordinatorErrorKind::InvalidReference);
        assert_eq!(backend.pull_calls.load(Ordering::SeqCst), 0);
        assert!(!sink.events_at(EventLevel::Error).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_transfer_times_out() {
        let backend = MemoryBackend::new();
        let sink = RecordingSink::new();
        backend.publish("app:v1", &TestImage::new(&linux_amd64(), &[b"x"]));
        backend.delay_pulls(Duration::from_secs(120));

        let err = coordinator(&backend, &sink)
            .pull("app:v1", None, Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(
            matches!(&err, CoordinatorError::Pull { source: TransferError::Timeout(d), .. } if *d == Duration::from_secs(5)),
            "{err}"
        );
        // The reporter was stopped and drained.
        let last = sink.last_render().unwrap();
        assert_eq!(last[0].state, TransferState::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_reporting_but_not_the_transfer() {
        let backend = MemoryBackend::new();
        let sink = RecordingSink::new();
        backend.publish("app:v1", &TestImage::new(&linux_amd64(), &[b"x"]));
        backend.delay_pulls(Duration::from_secs(2));
        let token = CancellationToken::new();
        let coordinator = TransferCoordinator::new(
            backend.clone(),
            sink.clone(),
            TransferSettings {
                platform: linux_amd64(),
                ..Default::default()
            },
        )
        .with_cancellation(token.clone());

        let watcher_sink = sink.clone();
        let watcher = async move {
            tokio::time::sleep(Duration::from_millis(550)).await;
            token.cancel();
            tokio::time::sleep(Duration::from_millis(50)).await;
            watcher_sink.renders().len()
        };
        let (result, renders_after_cancel) = tokio::join!(
            coordinator.pull("app:v1", None, TIMEOUT),
            watcher
        );

        result.unwrap();
        assert!(backend.has_image("app:v1"));
        assert_eq!(backend.pull_calls.load(Ordering::SeqCst), 1);
        // Nothing is rendered between the cancel and the end of the pull.
        assert_eq!(sink.renders().len(), renders_after_cancel);
        let last = sink.last_render().unwrap();
        assert!(last.iter().all(|r| r.state == TransferState::Done), "{last:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn progress_failures_do_not_fail_the_pull() {
        let backend = MemoryBackend::new();
        let sink = RecordingSink::new();
        backend.publish("app:v1", &TestImage::new(&linux_amd64(), &[b"x"]));
        backend.make_unavailable();

        let result = coordinator(&backend, &sink)
            .pull("app:v1", None, TIMEOUT)
            .await;
        assert!(result.is_ok(), "{result:?}");
    }
}

mod push {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_two_failures() {
        support::init_tracing();
        let backend = MemoryBackend::new();
        let sink = RecordingSink::new();
        backend.seed("registry.example.com/app:v1", &TestImage::new(&linux_amd64(), &[b"l"]));
        backend.fail_pushes([network_error(), network_error()]);

        let started = tokio::time::Instant::now();
        coordinator(&backend, &sink)
            .push("registry.example.com/app:v1", None, TIMEOUT)
            .await
            .unwrap();

        assert_eq!(backend.push_calls.load(Ordering::SeqCst), 3);
        assert_eq!(backend.delete_calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(started.elapsed() < Duration::from_secs(15));
        assert!(!backend.has_image("registry.example.com/app:v1"));
        assert!(backend.blob_count() > 0);

        let warnings = sink.events_at(EventLevel::Warn);
        assert_eq!(
            warnings,
            vec![
                "push failed, retrying (1/3)".to_string(),
                "push failed, retrying (2/3)".to_string(),
            ]
        );
        let last = sink.last_render().unwrap();
        assert!(last.iter().all(|r| r.state.is_terminal()), "{last:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_three_attempts() {
        let backend = MemoryBackend::new();
        let sink = RecordingSink::new();
        backend.seed("registry.example.com/app:v1", &TestImage::new(&linux_amd64(), &[b"l"]));
        backend.fail_pushes((0..5).map(|_| network_error()));

        let err = coordinator(&backend, &sink)
            .push("registry.example.com/app:v1", None, TIMEOUT)
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), Some(3));
        assert!(matches!(
            &err,
            CoordinatorError::Push { source: TransferError::Network(_), .. }
        ));
        assert_eq!(backend.push_calls.load(Ordering::SeqCst), 3);
        assert_eq!(backend.delete_calls.load(Ordering::SeqCst), 2);
        assert!(!backend.has_image("registry.example.com/app:v1"));
        assert_eq!(sink.events_at(EventLevel::Error).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn honours_configured_retry_policy() {
        let backend = MemoryBackend::new();
        let sink = RecordingSink::new();
        backend.seed("app:v1", &TestImage::new(&linux_amd64(), &[b"l"]));
        backend.fail_pushes((0..5).map(|_| network_error()));
        let coordinator = TransferCoordinator::new(
            backend.clone(),
            sink.clone(),
            TransferSettings {
                retry: RetryPolicy {
                    max_attempts: 5,
                    backoff: Duration::from_secs(1),
                },
                platform: linux_amd64(),
                ..Default::default()
            },
        );

        let started = tokio::time::Instant::now();
        let err = coordinator.push("app:v1", None, TIMEOUT).await.unwrap_err();
        assert_eq!(err.attempts(), Some(5));
        assert_eq!(backend.delete_calls.load(Ordering::SeqCst), 4);
        assert!(started.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_delete_between_attempts_is_tolerated() {
        let backend = MemoryBackend::new();
        let sink = RecordingSink::new();
        backend.seed("app:v1", &TestImage::new(&linux_amd64(), &[b"l"]));
        backend.fail_pushes([network_error()]);
        backend.fail_deletes();

        coordinator(&backend, &sink)
            .push("app:v1", None, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(backend.push_calls.load(Ordering::SeqCst), 2);
        assert_eq!(backend.delete_calls.load(Ordering::SeqCst), 1);
        assert!(backend.has_image("app:v1"));
    }

    #[tokio::test(start_paused = true)]
    async fn index_pushes_matching_child() {
        let backend = MemoryBackend::new();
        let sink = RecordingSink::new();
        let amd = TestImage::new(&linux_amd64(), &[b"amd"]);
        let arm = TestImage::new(&linux_arm64(), &[b"arm"]);
        let amd_digest = amd.target.digest.clone();
        backend.seed("app:multi", &TestImage::index(&[(linux_arm64(), arm), (linux_amd64(), amd)]));

        coordinator(&backend, &sink)
            .push("app:multi", None, TIMEOUT)
            .await
            .unwrap();
        let pushed = backend.pushed();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].1.digest, amd_digest);
    }

    #[tokio::test(start_paused = true)]
    async fn index_without_matching_child_is_pushed_whole() {
        let backend = MemoryBackend::new();
        let sink = RecordingSink::new();
        let arm = TestImage::new(&linux_arm64(), &[b"arm"]);
        let index = TestImage::index(&[(linux_arm64(), arm)]);
        backend.seed("app:arm-only", &index);

        coordinator(&backend, &sink)
            .push("app:arm-only", None, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(backend.pushed()[0].1.digest, index.target.digest);
        assert!(
            sink.events_at(EventLevel::Warn)
                .iter()
                .any(|m| m.contains("pushing the whole index"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_local_image_is_not_found() {
        let backend = MemoryBackend::new();
        let sink = RecordingSink::new();

        let err = coordinator(&backend, &sink)
            .push("app:absent", None, TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), CoordinatorErrorKind::NotFound);
        assert_eq!(backend.push_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            sink.events_at(EventLevel::Error).len(),
            1,
            "{:?}",
            sink.events()
        );
    }
}
