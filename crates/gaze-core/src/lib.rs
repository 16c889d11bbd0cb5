//! gaze-core — Face recognition data model, gallery store, and matcher.
//!
//! The detection and embedding models, the frame source, and the rendering
//! surface are external collaborators behind the traits in [`capability`];
//! this crate owns everything that is pure data and pure math.

pub mod capability;
pub mod gallery;
pub mod matcher;
pub mod types;

pub use capability::{
    DetectionError, DetectionModel, EmbeddingError, EmbeddingModel, FrameSource, OverlayRenderer,
};
pub use gallery::{EnrollmentError, Gallery, GalleryEntry, GalleryStore};
pub use matcher::{DistanceMetric, Match, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use types::{BoundingBox, DetectedFace, Descriptor, Frame, MatchResult};
