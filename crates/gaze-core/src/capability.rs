//! External collaborator seams: frame source, detection, embedding, overlay.
//!
//! The pipeline never talks to a camera or an inference engine directly;
//! every concrete backend (local ONNX session, remote inference service,
//! synthetic diagnostics source) plugs in behind one of these traits.

use crate::types::{DetectedFace, Descriptor, Frame, MatchResult};
use async_trait::async_trait;
use std::time::Instant;
use thiserror::Error;

/// Detection failure for one frame. Recoverable: the scheduler logs it and
/// moves on to the next cycle.
#[derive(Error, Debug, Clone)]
pub enum DetectionError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("detection inference failed: {0}")]
    Inference(String),
}

/// Embedding failure for one face. Recoverable per cycle.
#[derive(Error, Debug, Clone)]
pub enum EmbeddingError {
    #[error("face region ({x}, {y}) {width}x{height} outside {frame_width}x{frame_height} frame")]
    RegionOutOfBounds {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        frame_width: u32,
        frame_height: u32,
    },
    #[error("embedding inference failed: {0}")]
    Inference(String),
}

/// Yields the most recent video frame on demand.
///
/// `None` means the stream is not ready (camera warming up, tab hidden);
/// the scheduler treats it as a skipped cycle, not an error.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn current_frame(&self) -> Option<Frame>;
}

/// Locates all faces in a frame.
#[async_trait]
pub trait DetectionModel: Send + Sync {
    async fn detect(&self, frame: &Frame) -> Result<Vec<DetectedFace>, DetectionError>;
}

/// Produces a fixed-length identity descriptor for one detected face.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn embed(
        &self,
        frame: &Frame,
        face: &DetectedFace,
    ) -> Result<Descriptor, EmbeddingError>;
}

/// Draws the per-cycle match results.
///
/// Implementations run on their own task (see the pipeline's overlay driver)
/// and must therefore be cheap enough to keep up with the cycle cadence or
/// tolerate losing old cycles. An empty `results` slice means no faces this
/// cycle and should clear any previous drawing.
pub trait OverlayRenderer: Send {
    fn render(&mut self, results: &[MatchResult], timestamp: Instant);
}
