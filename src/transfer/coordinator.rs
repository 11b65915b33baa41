// ABOUTME: Orchestrates pulls and retrying pushes alongside a progress reporter.
// ABOUTME: Owns the reporter lifecycle, the discovery handler, and the retry loop.

use super::error::{
    CoordinatorError, ImageConfigSnafu, InspectSnafu, LookupSnafu, Operation,
    ParseReferenceSnafu, ProgressSnafu, ProgressTaskSnafu,
};
use super::inspect;
use super::retry::RetryPolicy;
use crate::progress::{
    DEFAULT_TICK_INTERVAL, DescriptorSet, Direction, EventLevel, ProgressReporter, ProgressSink,
    PushTracker,
};
use crate::runtime::traits::{
    ContentError, ImageBackend, ImageRecord, ImageStore, RegistryAuth, ResolverOptions, Transfer,
    TransferError,
};
use crate::types::{Descriptor, ImageConfig, ImageRef, Platform};
use snafu::{IntoError, ResultExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Default bound on a single pull or push call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Knobs for one coordinator.
#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub retry: RetryPolicy,
    pub tick_interval: Duration,
    pub timeout: Duration,
    /// Platform selected from multi-platform images.
    pub platform: Platform,
    /// Talk plain HTTP to every registry.
    pub plain_http: bool,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            platform: Platform::host(),
            plain_http: false,
        }
    }
}

/// Runs transfers against one backend and reports progress to one sink.
pub struct TransferCoordinator<B> {
    pub(super) backend: Arc<B>,
    pub(super) sink: Arc<dyn ProgressSink>,
    pub(super) settings: TransferSettings,
    cancel: CancellationToken,
}

impl<B: ImageBackend + 'static> TransferCoordinator<B> {
    pub fn new(backend: Arc<B>, sink: Arc<dyn ProgressSink>, settings: TransferSettings) -> Self {
        Self {
            backend,
            sink,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `token` as the parent of every reporter's stop signal.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Cancelling this token stops progress reporting. In-flight transfers
    /// still run until they finish or time out.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    /// Pull `reference` and return its runtime configuration. Never retries.
    pub async fn pull(
        &self,
        reference: &str,
        auth: Option<&RegistryAuth>,
        timeout: Duration,
    ) -> Result<ImageConfig, CoordinatorError> {
        let op = Operation::Pull;
        let image = self.parse(op, reference)?;
        let name = image.to_string();
        self.sink
            .event(EventLevel::Info, op.step(), &format!("pulling image {name}"));

        let jobs = Arc::new(DescriptorSet::new(&name));
        let stop = self.cancel.child_token();
        let reporter = ProgressReporter::new(
            jobs.clone(),
            self.backend.clone(),
            self.sink.clone(),
            Direction::Pull,
            self.settings.tick_interval,
        );
        let reporter_stop = stop.clone();
        let progress = tokio::spawn(async move {
            reporter
                .run(async move { reporter_stop.cancelled().await })
                .await
        });

        let handler = discovery_handler(jobs);
        let options = self.resolver_options(auth);
        let result = tokio::time::timeout(timeout, self.backend.pull(&image, &handler, &options))
            .await
            .unwrap_or_else(|_| Err(TransferError::Timeout(timeout)));

        stop.cancel();
        if let Err(err) = self.join_progress(op, &name, progress).await {
            warn!(image = %name, error = %err, "pull progress reporting failed");
        }

        let record = match result {
            Ok(record) => record,
            Err(source) => {
                self.report_failure(op, &format!("pull image {name} failed"), &source);
                return Err(CoordinatorError::Pull {
                    reference: name,
                    source,
                });
            }
        };

        info!(image = %name, digest = %record.target.digest, "pulled image");
        self.sink
            .event(EventLevel::Info, op.step(), &format!("pulled image {name}"));

        match inspect::image_config(&*self.backend, &record.target, &self.settings.platform).await {
            Ok(config) => Ok(config),
            Err(source) => {
                self.report_failure(op, &format!("read config of {name} failed"), &source);
                Err(ImageConfigSnafu { reference: name }.into_error(source))
            }
        }
    }

    /// Push the local image `reference`, retrying failed attempts.
    ///
    /// Between attempts the local image record is deleted and is not
    /// re-created afterwards; the image content stays in the store.
    pub async fn push(
        &self,
        reference: &str,
        auth: Option<&RegistryAuth>,
        timeout: Duration,
    ) -> Result<(), CoordinatorError> {
        let op = Operation::Push;
        let image = self.parse(op, reference)?;
        let name = image.to_string();
        self.sink
            .event(EventLevel::Info, op.step(), &format!("pushing image {name}"));

        let record = self
            .backend
            .get(&image)
            .await
            .context(LookupSnafu {
                operation: op,
                reference: name.clone(),
            })
            .inspect_err(|err| self.report_failure(op, "get image manifest failed", err))?;

        let target = self.push_target(&record, &name).await?;

        let jobs = Arc::new(DescriptorSet::new(&name));
        let tracker = Arc::new(PushTracker::new());
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let cancel = self.cancel.clone();
        let reporter = ProgressReporter::new(
            jobs.clone(),
            tracker.clone(),
            self.sink.clone(),
            Direction::Push,
            self.settings.tick_interval,
        );
        let progress = tokio::spawn(async move {
            reporter
                .run(async move {
                    tokio::select! {
                        _ = done_rx => {}
                        _ = cancel.cancelled() => {}
                    }
                })
                .await
        });

        let handler = discovery_handler(jobs);
        let options = self.resolver_options(auth);
        let mut retry = self.settings.retry.state::<TransferError>();

        let pushed = loop {
            let attempt = tokio::time::timeout(
                timeout,
                self.backend
                    .push(&image, &target, &handler, &options, tracker.clone()),
            )
            .await
            .unwrap_or_else(|_| Err(TransferError::Timeout(timeout)));

            let err = match attempt {
                Ok(()) => break Ok(()),
                Err(err) => err,
            };
            tracker.abort_all();

            let failed = retry.attempts_made();
            let max = retry.max_attempts();
            if !retry.record_failure(err) {
                break Err(failed);
            }

            let message = format!("push failed, retrying ({failed}/{max})");
            if let Some(err) = retry.last_error() {
                warn!(image = %name, attempt = failed, error = %err, "push failed, retrying");
            }
            self.sink.event(EventLevel::Warn, op.step(), &message);

            match self.backend.delete(&image).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    warn!(image = %name, error = %err, "failed to drop local image before retry");
                }
            }
            tokio::time::sleep(self.settings.retry.backoff).await;
        };

        drop(done_tx);
        let progress_result = self.join_progress(op, &name, progress).await;

        match (pushed, progress_result) {
            (Err(attempts), _) => {
                let source = match retry.into_last_error() {
                    Some(err) => err,
                    None => TransferError::Other("push failed".to_string()),
                };
                self.report_failure(op, &format!("push image {name} failed"), &source);
                Err(CoordinatorError::Push {
                    reference: name,
                    attempts,
                    source,
                })
            }
            (Ok(()), Err(err)) => {
                self.report_failure(op, "push progress failed", &err);
                Err(err)
            }
            (Ok(()), Ok(())) => {
                info!(image = %name, "pushed image");
                self.sink
                    .event(EventLevel::Info, op.step(), &format!("pushed image {name}"));
                Ok(())
            }
        }
    }

    /// Pick the manifest to push for the configured platform.
    ///
    /// An index with no matching child is pushed whole.
    async fn push_target(
        &self,
        record: &ImageRecord,
        name: &str,
    ) -> Result<Descriptor, CoordinatorError> {
        let op = Operation::Push;
        let platform = &self.settings.platform;
        let selected = inspect::select_platform_manifest(&*self.backend, &record.target, platform)
            .await
            .context(InspectSnafu {
                operation: op,
                reference: name.to_string(),
            })
            .inspect_err(|err| self.report_failure(op, "get image child manifests failed", err))?;

        Ok(match selected {
            Some(descriptor) => descriptor,
            None => {
                warn!(image = %name, %platform, "no manifest matches platform, pushing the whole index");
                self.sink.event(
                    EventLevel::Warn,
                    op.step(),
                    &format!("no manifest for {platform} in {name}, pushing the whole index"),
                );
                record.target.clone()
            }
        })
    }

    async fn join_progress(
        &self,
        op: Operation,
        name: &str,
        progress: JoinHandle<Result<(), ContentError>>,
    ) -> Result<(), CoordinatorError> {
        let joined: Result<Result<(), ContentError>, JoinError> = progress.await;
        joined
            .context(ProgressTaskSnafu {
                operation: op,
                reference: name.to_string(),
            })?
            .context(ProgressSnafu {
                operation: op,
                reference: name.to_string(),
            })
    }

    pub(super) fn parse(&self, op: Operation, reference: &str) -> Result<ImageRef, CoordinatorError> {
        ImageRef::parse(reference)
            .context(ParseReferenceSnafu {
                operation: op,
                input: reference.to_string(),
            })
            .inspect_err(|err| self.report_failure(op, "parse image reference failed", err))
    }

    pub(super) fn resolver_options(&self, auth: Option<&RegistryAuth>) -> ResolverOptions {
        ResolverOptions {
            auth: auth.cloned(),
            plain_http: self.settings.plain_http,
            platform: Some(self.settings.platform.clone()),
        }
    }

    /// Log a failing step and show it to whoever watches the sink.
    pub(super) fn report_failure(&self, op: Operation, step: &str, err: &dyn fmt::Display) {
        error!(operation = %op, error = %err, "{step}");
        self.sink
            .event(EventLevel::Error, op.step(), &format!("{step}: {err}"));
    }
}

/// Forward every descriptor except legacy schema 1 manifests into `jobs`.
fn discovery_handler(jobs: Arc<DescriptorSet>) -> impl Fn(&Descriptor) + Send + Sync {
    move |descriptor: &Descriptor| {
        if !descriptor.is_schema1() {
            jobs.add(descriptor);
        }
    }
}
