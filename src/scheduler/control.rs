//! The sweep loop: on every tick, submit each stale watcher to its domain queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, error, info, warn};

use super::submit::JobSubmitter;
use crate::domain::queue_name_for;
use crate::error::{Error, Result};
use crate::model::{Filter, Watcher};
use crate::storage::WatcherStore;
use crate::telemetry::metrics;
use crate::telemetry::sweep::{record_sweep_outcome, start_sweep_span};

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// A watcher is due once more than this many hours passed since its last price.
    pub staleness_threshold_hours: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10 * 60),
            staleness_threshold_hours: 6.0,
        }
    }
}

impl SchedulerConfig {
    pub fn staleness_threshold(&self) -> chrono::Duration {
        chrono::Duration::milliseconds((self.staleness_threshold_hours * 3_600_000.0).round() as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Sweeping,
}

/// Tally of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Watchers read from the store.
    pub examined: usize,
    /// Accepted by a queue, including ones that were already waiting there.
    pub submitted: usize,
    /// Checked recently enough to skip.
    pub fresh: usize,
    /// Skipped because a worker is still on it.
    pub in_flight: usize,
    /// Submission failed; retried on the next sweep.
    pub failed: usize,
}

/// Why a watcher was or wasn't submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Due,
    Fresh,
    InFlight,
}

/// Decide whether `watcher` should be queued at `now`.
///
/// A watcher marked in-flight is left alone until it has been stale for twice
/// the threshold; past that the mark is treated as abandoned.
pub fn decide(watcher: &Watcher, now: DateTime<Utc>, threshold: chrono::Duration) -> Decision {
    let age = watcher.since_last_check(now);
    if age <= threshold {
        Decision::Fresh
    } else if watcher.is_checking && age <= threshold * 2 {
        Decision::InFlight
    } else {
        Decision::Due
    }
}

/// Periodic sweeper. Clones share the shutdown signal and state.
#[derive(Clone)]
pub struct Scheduler {
    store: WatcherStore,
    submitter: Arc<dyn JobSubmitter>,
    config: SchedulerConfig,
    shutdown: Arc<Notify>,
    sweeping: Arc<AtomicBool>,
}

/// Marks the scheduler as sweeping for as long as it lives.
struct SweepingGuard<'a>(&'a AtomicBool);

impl<'a> SweepingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for SweepingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Scheduler {
    pub fn new(store: WatcherStore, submitter: Arc<dyn JobSubmitter>, config: SchedulerConfig) -> Self {
        Self {
            store,
            submitter,
            config,
            shutdown: Arc::new(Notify::new()),
            sweeping: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state(&self) -> SchedulerState {
        if self.sweeping.load(Ordering::SeqCst) {
            SchedulerState::Sweeping
        } else {
            SchedulerState::Idle
        }
    }

    /// Signal the loop to stop after the current sweep.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Sweep immediately, then once per interval, until shutdown.
    ///
    /// Sweeps run inline, so they never overlap; ticks that elapse while a
    /// sweep is still running are dropped. A storage failure ends the loop
    /// with that error.
    pub async fn run(&self) -> Result<()> {
        if self.config.interval.is_zero() {
            return Err(Error::Config("scheduler interval must be positive".to_string()));
        }

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.config.interval.as_secs(),
            threshold_hours = self.config.staleness_threshold_hours,
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("scheduler shutting down");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.sweep().await {
                error!("sweep aborted: {e}");
                return Err(e);
            }
        }
    }

    /// One full pass over the store, using the current time.
    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// One full pass over the store as of `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let _guard = SweepingGuard::enter(&self.sweeping);
        let span = start_sweep_span(self.config.staleness_threshold_hours);
        let started = Instant::now();

        let report = self.sweep_inner(now).instrument(span.clone()).await?;

        metrics::sweep_duration_ms().record(started.elapsed().as_secs_f64() * 1000.0, &[]);
        record_sweep_outcome(&span, &report);
        Ok(report)
    }

    async fn sweep_inner(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let watchers = self.store.blocking(|store| store.list(&Filter::new())).await?;

        let threshold = self.config.staleness_threshold();
        let mut report = SweepReport {
            examined: watchers.len(),
            ..SweepReport::default()
        };

        for watcher in &watchers {
            let outcome = match decide(watcher, now, threshold) {
                Decision::Fresh => {
                    report.fresh += 1;
                    "fresh"
                }
                Decision::InFlight => {
                    debug!(id = %watcher.id, "watcher still in flight");
                    report.in_flight += 1;
                    "in_flight"
                }
                Decision::Due => {
                    if self.submit(watcher).await {
                        report.submitted += 1;
                        "submitted"
                    } else {
                        report.failed += 1;
                        "failed"
                    }
                }
            };
            metrics::sweep_watchers().add(1, &[KeyValue::new("result", outcome)]);
        }

        Ok(report)
    }

    /// Submit one watcher and mark it in flight unless a price already came
    /// back for it. Failures are logged, not raised.
    async fn submit(&self, watcher: &Watcher) -> bool {
        let queue = queue_name_for(&watcher.domain);
        debug!(id = %watcher.id, %queue, "adding watcher to queue");

        if let Err(e) = self.submitter.submit(&queue, watcher).await {
            warn!(id = %watcher.id, %queue, error = %e, "submission failed");
            return false;
        }

        let id = watcher.id;
        let seen = watcher.clone();
        match self.store.blocking(move |store| store.mark_checking(&seen)).await {
            Ok(true) => {}
            Ok(false) => debug!(%id, "price arrived before the in-flight mark, left unmarked"),
            Err(e) => warn!(%id, error = %e, "could not mark watcher in flight"),
        }
        true
    }
}
