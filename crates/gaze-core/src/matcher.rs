//! Nearest-neighbor classification of descriptors against the gallery.

use crate::gallery::Gallery;
use crate::types::{BoundingBox, Descriptor, MatchResult};
use serde::{Deserialize, Serialize};

/// Default acceptance threshold, tuned for Euclidean distance over
/// L2-normalized 128-dim descriptors.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Distance function used to compare descriptors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    /// `1 - cosine similarity`; prefer for unnormalized descriptors.
    Cosine,
}

impl DistanceMetric {
    pub fn distance(&self, a: &Descriptor, b: &Descriptor) -> f32 {
        match self {
            DistanceMetric::Euclidean => a.euclidean_distance(b),
            DistanceMetric::Cosine => a.cosine_distance(b),
        }
    }
}

/// Verdict for one probe descriptor, before the bounding box is attached.
#[derive(Debug, Clone)]
pub struct Match {
    pub matched: bool,
    pub label: Option<String>,
    pub distance: f32,
    pub threshold: f32,
}

impl Match {
    /// Attach the probe face's bounding box to form the published result.
    pub fn into_result(self, bounding_box: BoundingBox) -> MatchResult {
        MatchResult {
            bounding_box,
            matched: self.matched,
            label: self.label,
            distance: self.distance,
            threshold: self.threshold,
        }
    }
}

/// Nearest-neighbor matcher with a rejection threshold.
///
/// An entry's best distance is the minimum over its reference descriptors;
/// the entry with the globally smallest best distance wins. Ties go to the
/// entry enrolled first (the scan keeps the earlier entry on equal distance).
#[derive(Debug, Clone)]
pub struct Matcher {
    metric: DistanceMetric,
    threshold: f32,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(DistanceMetric::Euclidean, DEFAULT_MATCH_THRESHOLD)
    }
}

impl Matcher {
    pub fn new(metric: DistanceMetric, threshold: f32) -> Self {
        Self { metric, threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Classify a probe descriptor against a gallery snapshot.
    ///
    /// Every entry is scanned; there is no early exit. An empty gallery (or
    /// one whose entries have no descriptors) yields an unknown verdict with
    /// `f32::INFINITY` distance, never an error.
    pub fn classify(&self, probe: &Descriptor, gallery: &Gallery) -> Match {
        let mut best_distance = f32::INFINITY;
        let mut best_label: Option<&str> = None;

        for entry in gallery.entries() {
            let entry_best = entry
                .descriptors
                .iter()
                .map(|d| self.metric.distance(probe, d))
                .fold(f32::INFINITY, f32::min);

            // Strict `<` keeps the first-enrolled entry on a tie.
            if entry_best < best_distance {
                best_distance = entry_best;
                best_label = Some(entry.label.as_str());
            }
        }

        let matched = best_label.is_some() && best_distance <= self.threshold;
        tracing::trace!(
            label = best_label.unwrap_or("unknown"),
            distance = best_distance,
            threshold = self.threshold,
            matched,
            "classified descriptor"
        );

        Match {
            matched,
            label: if matched {
                best_label.map(str::to_owned)
            } else {
                None
            },
            distance: best_distance,
            threshold: self.threshold,
        }
    }
}
