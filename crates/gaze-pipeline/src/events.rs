//! Events published by the scheduler to its subscribers.

use gaze_core::{DetectionError, EmbeddingError, MatchResult};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why one recognition cycle failed. Always recoverable: the scheduler
/// publishes the event and keeps going.
#[derive(Error, Debug, Clone)]
pub enum CycleError {
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// One entry in the pipeline's result/health stream.
///
/// Events from a single pipeline are published in order from one task, so
/// `CycleCompleted` timestamps are non-decreasing.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A full cycle finished. `results` is ordered like the detector's
    /// output and is empty when no faces were found — subscribers should
    /// clear any prior overlay in that case.
    CycleCompleted {
        /// Capture timestamp of the frame these results describe.
        timestamp: Instant,
        /// Source sequence number of that frame.
        sequence: u64,
        results: Vec<MatchResult>,
    },
    /// The frame source was not ready; nothing was inferred. Not an error.
    CycleSkipped { at: Instant },
    /// Detection or embedding failed; the cycle was abandoned.
    CycleFailed { at: Instant, error: CycleError },
    /// The cycle exceeded its time budget and was abandoned.
    CycleTimedOut { at: Instant, budget: Duration },
    /// Too many consecutive failures; the pipeline keeps retrying but the
    /// UI layer should surface a warning.
    PipelineDegraded { consecutive_failures: u32 },
    /// First successful cycle after a degraded period.
    PipelineRecovered,
}

impl PipelineEvent {
    /// Short name for logs and counters.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::CycleCompleted { .. } => "cycle_completed",
            PipelineEvent::CycleSkipped { .. } => "cycle_skipped",
            PipelineEvent::CycleFailed { .. } => "cycle_failed",
            PipelineEvent::CycleTimedOut { .. } => "cycle_timed_out",
            PipelineEvent::PipelineDegraded { .. } => "pipeline_degraded",
            PipelineEvent::PipelineRecovered => "pipeline_recovered",
        }
    }
}
