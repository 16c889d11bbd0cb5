//! The recognition scheduler: a bounded-cadence detect→embed→match loop.
//!
//! One task drives the whole pipeline. The cycle is awaited inline, so at
//! most one inference cycle is ever in flight; interval ticks that fire while
//! a cycle is running are dropped, not queued. When inference is slower than
//! the configured interval the pipeline processes the newest frame it can
//! get, never a backlog of stale ones.

use crate::config::{ConfigError, PipelineConfig};
use crate::events::{CycleError, PipelineEvent};
use gaze_core::{DetectionModel, EmbeddingModel, FrameSource, GalleryStore, Matcher};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Live counters for the scheduler loop.
#[derive(Debug, Default)]
pub struct PipelineStats {
    cycles_completed: AtomicU64,
    cycles_skipped: AtomicU64,
    cycles_failed: AtomicU64,
    cycles_timed_out: AtomicU64,
    ticks_dropped: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatsSnapshot {
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
    pub cycles_failed: u64,
    pub cycles_timed_out: u64,
    pub ticks_dropped: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            cycles_timed_out: self.cycles_timed_out.load(Ordering::Relaxed),
            ticks_dropped: self.ticks_dropped.load(Ordering::Relaxed),
        }
    }
}

/// The assembled pipeline, ready to spawn.
pub struct Pipeline<S, D, E> {
    source: S,
    detector: D,
    embedder: E,
    store: Arc<GalleryStore>,
    config: PipelineConfig,
}

impl<S, D, E> Pipeline<S, D, E>
where
    S: FrameSource + 'static,
    D: DetectionModel + 'static,
    E: EmbeddingModel + 'static,
{
    pub fn new(
        source: S,
        detector: D,
        embedder: E,
        store: Arc<GalleryStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            detector,
            embedder,
            store,
            config,
        }
    }

    /// Validate the configuration and spawn the scheduler loop.
    ///
    /// Misconfiguration is the only fatal condition in the pipeline and is
    /// rejected here, before any cycle runs.
    pub fn spawn(self) -> Result<PipelineHandle, ConfigError> {
        self.config.validate()?;

        let (events, _) = broadcast::channel(self.config.event_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(PipelineStats::default());

        tracing::info!(
            interval_ms = self.config.interval_ms,
            cycle_timeout_ms = self.config.cycle_timeout_ms,
            degraded_after = self.config.degraded_after,
            threshold = self.config.match_threshold,
            metric = ?self.config.metric,
            "recognition scheduler starting"
        );

        let worker = Worker {
            source: self.source,
            detector: self.detector,
            embedder: self.embedder,
            store: self.store,
            matcher: Matcher::new(self.config.metric, self.config.match_threshold),
            config: self.config,
            events: events.clone(),
            stats: stats.clone(),
            consecutive_failures: 0,
            degraded: false,
        };

        let task = tokio::spawn(worker.run(shutdown_rx));

        Ok(PipelineHandle {
            events,
            shutdown: shutdown_tx,
            stats,
            task,
        })
    }
}

/// Handle to a running pipeline.
///
/// Stop policy: [`stop`](Self::stop) prevents new cycle starts. A cycle
/// already in flight runs to completion and its results are still delivered
/// to subscribers; there is no hard-cancel.
pub struct PipelineHandle {
    events: broadcast::Sender<PipelineEvent>,
    shutdown: watch::Sender<bool>,
    stats: Arc<PipelineStats>,
    task: JoinHandle<()>,
}

impl PipelineHandle {
    /// Subscribe to the event stream. A receiver that falls behind by more
    /// than the configured capacity loses the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Prevent any further cycles from starting.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for the scheduler loop to exit.
    pub async fn join(self) {
        let _ = self.task.await;
    }

    /// Convenience: `stop()` then wait for the in-flight cycle to drain.
    pub async fn shutdown(self) {
        self.stop();
        self.join().await;
    }
}

enum CycleOutcome {
    Completed { faces: usize },
    Skipped,
    Failed(CycleError),
}

struct Worker<S, D, E> {
    source: S,
    detector: D,
    embedder: E,
    store: Arc<GalleryStore>,
    matcher: Matcher,
    config: PipelineConfig,
    events: broadcast::Sender<PipelineEvent>,
    stats: Arc<PipelineStats>,
    consecutive_failures: u32,
    degraded: bool,
}

impl<S, D, E> Worker<S, D, E>
where
    S: FrameSource,
    D: DetectionModel,
    E: EmbeddingModel,
{
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.interval();
        let mut ticker = tokio::time::interval(period);
        // Drop-not-queue: ticks missed while a cycle is in flight are
        // skipped rather than delivered as a burst afterwards.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick: Option<tokio::time::Instant> = None;

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    // Err means the handle is gone; treat as stop.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                tick = ticker.tick() => {
                    if let Some(prev) = last_tick {
                        let periods =
                            (tick.duration_since(prev).as_nanos() / period.as_nanos()) as u64;
                        if periods > 1 {
                            self.stats.ticks_dropped.fetch_add(periods - 1, Ordering::Relaxed);
                            tracing::debug!(
                                dropped = periods - 1,
                                "ticks dropped while cycle was in flight"
                            );
                        }
                    }
                    last_tick = Some(tick);
                    // Awaited inline: a new tick cannot start a cycle until
                    // this one finishes, and stop() cannot abandon it.
                    self.run_cycle().await;
                }
            }
        }

        tracing::info!(stats = ?self.stats.snapshot(), "recognition scheduler stopped");
    }

    async fn run_cycle(&mut self) {
        let budget = self.config.cycle_timeout();
        match tokio::time::timeout(budget, self.cycle_once()).await {
            Ok(CycleOutcome::Completed { faces }) => {
                self.stats.cycles_completed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(faces, "cycle completed");
                self.note_success();
            }
            Ok(CycleOutcome::Skipped) => {
                // Source not ready. Neither a failure nor a success for the
                // degradation counter: a warming-up camera must not trip the
                // threshold, and must not mask a failing model either.
                self.stats.cycles_skipped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("cycle skipped, frame source not ready");
                self.publish(PipelineEvent::CycleSkipped { at: Instant::now() });
            }
            Ok(CycleOutcome::Failed(error)) => {
                self.stats.cycles_failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %error, "cycle failed");
                self.publish(PipelineEvent::CycleFailed {
                    at: Instant::now(),
                    error,
                });
                self.note_failure();
            }
            Err(_) => {
                self.stats.cycles_timed_out.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(budget_ms = budget.as_millis() as u64, "cycle timed out");
                self.publish(PipelineEvent::CycleTimedOut {
                    at: Instant::now(),
                    budget,
                });
                self.note_failure();
            }
        }
    }

    /// One full pass: acquire → detect → (embed → match) per face → publish.
    async fn cycle_once(&self) -> CycleOutcome {
        let Some(frame) = self.source.current_frame().await else {
            return CycleOutcome::Skipped;
        };

        let faces = match self.detector.detect(&frame).await {
            Ok(faces) => faces,
            Err(e) => return CycleOutcome::Failed(e.into()),
        };

        // One snapshot per cycle: enrollment during the cycle takes effect
        // on the next one, never mid-match.
        let gallery = self.store.snapshot();

        let mut results = Vec::with_capacity(faces.len());
        for face in &faces {
            let descriptor = match self.embedder.embed(&frame, face).await {
                Ok(d) => d,
                Err(e) => return CycleOutcome::Failed(e.into()),
            };
            results.push(
                self.matcher
                    .classify(&descriptor, &gallery)
                    .into_result(face.bounding_box.clone()),
            );
        }

        let faces = results.len();
        self.publish(PipelineEvent::CycleCompleted {
            timestamp: frame.timestamp,
            sequence: frame.sequence,
            results,
        });
        CycleOutcome::Completed { faces }
    }

    fn note_success(&mut self) {
        if self.degraded {
            tracing::info!("pipeline recovered");
            self.publish(PipelineEvent::PipelineRecovered);
            self.degraded = false;
        }
        self.consecutive_failures = 0;
    }

    fn note_failure(&mut self) {
        self.consecutive_failures += 1;
        // Emit exactly once, when the threshold is crossed.
        if self.consecutive_failures == self.config.degraded_after {
            self.degraded = true;
            tracing::warn!(
                consecutive_failures = self.consecutive_failures,
                "pipeline degraded"
            );
            self.publish(PipelineEvent::PipelineDegraded {
                consecutive_failures: self.consecutive_failures,
            });
        }
    }

    fn publish(&self, event: PipelineEvent) {
        // No subscribers is fine; results are simply discarded.
        let _ = self.events.send(event);
    }
}
