//! Overlay driver: feeds match results to a renderer on its own task.

use crate::events::PipelineEvent;
use gaze_core::OverlayRenderer;
use tokio::sync::broadcast;

/// Consume pipeline events and drive an [`OverlayRenderer`].
///
/// Runs until the event channel closes (pipeline dropped). Rendering happens
/// on this task, never on the scheduler's, so a slow renderer cannot block
/// the next cycle — it instead lags the broadcast channel and loses the
/// oldest cycles, keeping the overlay fresh.
pub async fn drive_overlay<R: OverlayRenderer>(
    mut events: broadcast::Receiver<PipelineEvent>,
    mut renderer: R,
) {
    loop {
        match events.recv().await {
            Ok(PipelineEvent::CycleCompleted {
                timestamp, results, ..
            }) => {
                renderer.render(&results, timestamp);
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "overlay fell behind; dropped stale cycles");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
