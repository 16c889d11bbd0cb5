//! Core data model: frames, detections, descriptors, and match results.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// A captured grayscale video frame.
///
/// The pixel buffer sits behind an `Arc` so handing a frame to an inference
/// cycle is a pointer copy. A frame is immutable once produced and is
/// discarded when its cycle completes.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    /// Capture time, used to tag every result derived from this frame.
    pub timestamp: Instant,
    /// Monotonically increasing capture counter from the source.
    pub sequence: u64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            timestamp: Instant::now(),
            sequence,
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Bounding box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// A face located by the detection model in a single frame.
///
/// Consumed immediately by the embedding model; never retained across cycles.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bounding_box: BoundingBox,
    /// Optional facial landmarks in detector order (e.g., eyes, nose, mouth).
    pub landmarks: Option<Vec<(f32, f32)>>,
    /// Capture timestamp of the frame this face was found in.
    pub timestamp: Instant,
}

/// Fixed-length identity embedding for one face.
///
/// A value type: compared only through the distance functions, never mutated
/// in place. Dimensionality is fixed by the embedding model (e.g., 128).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance to another descriptor.
    pub fn euclidean_distance(&self, other: &Descriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Cosine distance to another descriptor: `1 - cosine similarity`.
    ///
    /// Zero for identical directions, 2 for opposite. Zero-norm input yields
    /// the maximum distance rather than NaN.
    pub fn cosine_distance(&self, other: &Descriptor) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            1.0 - dot / denom
        } else {
            2.0
        }
    }
}

/// Classification of one detected face against the gallery.
///
/// `matched == false` means the face is unknown: no gallery entry came within
/// the threshold. `distance` is still the best distance found
/// (`f32::INFINITY` against an empty gallery). One result is published per
/// detected face per cycle, then discarded.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub bounding_box: BoundingBox,
    pub matched: bool,
    /// Label of the matched gallery entry; `None` when unknown.
    pub label: Option<String>,
    /// Minimum distance between this face and any gallery descriptor.
    pub distance: f32,
    /// The acceptance threshold that produced this verdict.
    pub threshold: f32,
}

impl MatchResult {
    /// Display label for overlays: the entry label or `"unknown"`.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or("unknown")
    }
}
