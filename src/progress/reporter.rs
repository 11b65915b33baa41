// ABOUTME: Periodic progress loop that polls a status source and renders snapshots.
// ABOUTME: Runs until its stop future fires, then renders one final forced-done pass.

use super::jobs::DescriptorSet;
use super::sink::ProgressSink;
use super::status::{Direction, Lookup, MergeInput, StatusMerger};
use crate::runtime::traits::{ContentError, StatusSource};
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

/// Default time between progress ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Shorter intervals, including zero, are raised to this.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Drives a `StatusMerger` on an interval and hands each snapshot to a sink.
pub struct ProgressReporter<S: StatusSource + ?Sized> {
    jobs: Arc<DescriptorSet>,
    source: Arc<S>,
    sink: Arc<dyn ProgressSink>,
    merger: StatusMerger,
    interval: Duration,
    started: Instant,
}

impl<S: StatusSource + ?Sized> ProgressReporter<S> {
    pub fn new(
        jobs: Arc<DescriptorSet>,
        source: Arc<S>,
        sink: Arc<dyn ProgressSink>,
        direction: Direction,
        interval: Duration,
    ) -> Self {
        let merger = StatusMerger::new(jobs.name(), direction, Utc::now());
        Self {
            jobs,
            source,
            sink,
            merger,
            interval: interval.max(MIN_TICK_INTERVAL),
            started: Instant::now(),
        }
    }

    /// Tick until `stop` resolves, then render the final pass and return.
    ///
    /// Transient status errors skip a tick. An unreachable store ends the
    /// loop early and is returned.
    pub async fn run<F>(mut self, stop: F) -> Result<(), ContentError>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(stop);

        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.poll().await {
                        if err.is_hard_failure() {
                            error!(transfer = %self.jobs.name(), error = %err, "progress source unavailable");
                            return Err(err);
                        }
                        warn!(transfer = %self.jobs.name(), error = %err, "progress check failed, skipping tick");
                    }
                }
            }
        }

        self.drain();
        Ok(())
    }

    async fn poll(&mut self) -> Result<(), ContentError> {
        let descriptors = self.jobs.list();
        let active = self.source.active().await?;

        let pending = self.merger.pending_lookups(&descriptors, &active);
        let mut lookups = HashMap::with_capacity(pending.len());
        for digest in pending {
            let lookup = match self.source.info(&digest).await {
                Ok(info) => Lookup::Found(info),
                Err(err) if err.is_not_found() => Lookup::Missing,
                Err(err) => return Err(err),
            };
            lookups.insert(digest, lookup);
        }

        let rows = self.merger.merge(MergeInput {
            descriptors: &descriptors,
            active: &active,
            lookups: &lookups,
            done: false,
        });
        self.sink.render(&rows, self.started.elapsed());
        Ok(())
    }

    /// Final pass: no store queries, every row forced terminal.
    fn drain(&mut self) {
        let descriptors = self.jobs.list();
        let rows = self.merger.merge(MergeInput {
            descriptors: &descriptors,
            active: &[],
            lookups: &HashMap::new(),
            done: true,
        });
        debug!(transfer = %self.jobs.name(), rows = rows.len(), "progress finished");
        self.sink.render(&rows, self.started.elapsed());
    }
}
