//! Gallery of enrolled identities and the store that builds it.
//!
//! The store hands out immutable `Arc<Gallery>` snapshots. Enrollment builds
//! a new snapshot and swaps it in; a matcher holding the previous snapshot
//! keeps reading consistent data until its cycle finishes.

use crate::capability::{DetectionError, DetectionModel, EmbeddingError, EmbeddingModel};
use crate::types::{Descriptor, Frame};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrollmentError {
    #[error("label must not be empty")]
    EmptyLabel,
    #[error("at least one reference image is required")]
    NoImages,
    #[error("no face found in reference image {image_index}")]
    NoFaceFound { image_index: usize },
    #[error("reference image {image_index} contains {count} faces, expected exactly one")]
    AmbiguousFace { image_index: usize, count: usize },
    #[error("embedding model produced a zero-length descriptor")]
    EmptyDescriptor,
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// One enrolled identity: a label and its reference descriptors.
///
/// Several descriptors per identity (captured from several reference images)
/// make matching robust to pose and lighting.
#[derive(Debug, Clone, Serialize)]
pub struct GalleryEntry {
    pub label: String,
    pub descriptors: Vec<Descriptor>,
    pub enrolled_at: DateTime<Utc>,
}

/// Immutable, insertion-ordered set of enrolled identities.
///
/// Insertion order is load-bearing: the matcher's tie-break gives the
/// first-enrolled entry precedence.
#[derive(Debug, Default, Serialize)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn from_entries(entries: Vec<GalleryEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<&GalleryEntry> {
        self.entries.iter().find(|e| e.label == label)
    }
}

/// Builds and holds the gallery; the only way to mutate it is `enroll`.
#[derive(Default)]
pub struct GalleryStore {
    snapshot: RwLock<Arc<Gallery>>,
}

impl GalleryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current immutable snapshot for use by a matcher.
    pub fn snapshot(&self) -> Arc<Gallery> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn labels(&self) -> Vec<String> {
        self.snapshot()
            .entries()
            .iter()
            .map(|e| e.label.clone())
            .collect()
    }

    /// Enroll `label` from one or more reference images.
    ///
    /// Each image must contain exactly one face; its descriptor is appended
    /// to the entry for `label`, creating the entry on first enrollment.
    /// Returns the entry's total descriptor count. On any error the gallery
    /// is left unchanged — no partial enrollment is published.
    pub async fn enroll<D, E>(
        &self,
        label: &str,
        images: &[Frame],
        detector: &D,
        embedder: &E,
    ) -> Result<usize, EnrollmentError>
    where
        D: DetectionModel + ?Sized,
        E: EmbeddingModel + ?Sized,
    {
        if label.is_empty() {
            return Err(EnrollmentError::EmptyLabel);
        }
        if images.is_empty() {
            return Err(EnrollmentError::NoImages);
        }

        let mut new_descriptors = Vec::with_capacity(images.len());
        for (image_index, image) in images.iter().enumerate() {
            let faces = detector.detect(image).await?;
            let face = match faces.as_slice() {
                [] => return Err(EnrollmentError::NoFaceFound { image_index }),
                [face] => face,
                many => {
                    return Err(EnrollmentError::AmbiguousFace {
                        image_index,
                        count: many.len(),
                    })
                }
            };

            let descriptor = embedder.embed(image, face).await?;
            if descriptor.is_empty() {
                return Err(EnrollmentError::EmptyDescriptor);
            }
            new_descriptors.push(descriptor);
        }

        // All inference done; build the replacement snapshot under the lock.
        let mut guard = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        let mut entries = guard.entries.clone();
        let count = match entries.iter_mut().find(|e| e.label == label) {
            Some(entry) => {
                entry.descriptors.extend(new_descriptors);
                entry.descriptors.len()
            }
            None => {
                let count = new_descriptors.len();
                entries.push(GalleryEntry {
                    label: label.to_string(),
                    descriptors: new_descriptors,
                    enrolled_at: Utc::now(),
                });
                count
            }
        };
        *guard = Arc::new(Gallery { entries });
        drop(guard);

        tracing::info!(label, descriptors = count, "enrolled identity");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, DetectedFace};
    use async_trait::async_trait;

    /// Detector that reports a fixed number of faces per frame.
    struct FixedDetector {
        faces: usize,
    }

    #[async_trait]
    impl DetectionModel for FixedDetector {
        async fn detect(&self, frame: &Frame) -> Result<Vec<DetectedFace>, DetectionError> {
            Ok((0..self.faces)
                .map(|_| DetectedFace {
                    bounding_box: BoundingBox {
                        x: 0.0,
                        y: 0.0,
                        width: frame.width as f32,
                        height: frame.height as f32,
                        confidence: 0.9,
                    },
                    landmarks: None,
                    timestamp: frame.timestamp,
                })
                .collect())
        }
    }

    /// Embedder that encodes the frame's first pixel as a 2-dim descriptor.
    struct PixelEmbedder;

    #[async_trait]
    impl EmbeddingModel for PixelEmbedder {
        async fn embed(
            &self,
            frame: &Frame,
            _face: &DetectedFace,
        ) -> Result<Descriptor, EmbeddingError> {
            let v = frame.data.first().copied().unwrap_or(0) as f32;
            Ok(Descriptor::new(vec![v, v]))
        }
    }

    fn frame(pixel: u8) -> Frame {
        Frame::new(vec![pixel; 16], 4, 4, 0)
    }

    #[tokio::test]
    async fn test_enroll_creates_entry_with_one_descriptor_per_image() {
        let store = GalleryStore::new();
        let count = store
            .enroll(
                "alice",
                &[frame(10), frame(20), frame(30)],
                &FixedDetector { faces: 1 },
                &PixelEmbedder,
            )
            .await
            .unwrap();
        assert_eq!(count, 3);

        let gallery = store.snapshot();
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery.get("alice").unwrap().descriptors.len(), 3);
    }

    #[tokio::test]
    async fn test_enroll_same_label_appends() {
        let store = GalleryStore::new();
        let detector = FixedDetector { faces: 1 };
        store
            .enroll("alice", &[frame(10)], &detector, &PixelEmbedder)
            .await
            .unwrap();
        let count = store
            .enroll("alice", &[frame(20)], &detector, &PixelEmbedder)
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_enroll_preserves_insertion_order() {
        let store = GalleryStore::new();
        let detector = FixedDetector { faces: 1 };
        for label in ["alice", "bob", "carol"] {
            store
                .enroll(label, &[frame(1)], &detector, &PixelEmbedder)
                .await
                .unwrap();
        }
        assert_eq!(store.labels(), vec!["alice", "bob", "carol"]);
    }

    #[tokio::test]
    async fn test_enroll_no_face_found() {
        let store = GalleryStore::new();
        let err = store
            .enroll(
                "alice",
                &[frame(10)],
                &FixedDetector { faces: 0 },
                &PixelEmbedder,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EnrollmentError::NoFaceFound { image_index: 0 }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_enroll_ambiguous_face() {
        let store = GalleryStore::new();
        let err = store
            .enroll(
                "alice",
                &[frame(10)],
                &FixedDetector { faces: 2 },
                &PixelEmbedder,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EnrollmentError::AmbiguousFace {
                image_index: 0,
                count: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_enroll_failure_leaves_gallery_unchanged() {
        let store = GalleryStore::new();
        store
            .enroll(
                "alice",
                &[frame(10)],
                &FixedDetector { faces: 1 },
                &PixelEmbedder,
            )
            .await
            .unwrap();

        // Second image of the batch has no face; nothing may be appended.
        struct FlakyDetector;
        #[async_trait]
        impl DetectionModel for FlakyDetector {
            async fn detect(&self, frame: &Frame) -> Result<Vec<DetectedFace>, DetectionError> {
                if frame.data[0] == 99 {
                    return Ok(vec![]);
                }
                FixedDetector { faces: 1 }.detect(frame).await
            }
        }

        let err = store
            .enroll("alice", &[frame(1), frame(99)], &FlakyDetector, &PixelEmbedder)
            .await
            .unwrap_err();
        assert!(matches!(err, EnrollmentError::NoFaceFound { image_index: 1 }));
        assert_eq!(store.snapshot().get("alice").unwrap().descriptors.len(), 1);
    }

    #[tokio::test]
    async fn test_enroll_rejects_empty_label_and_no_images() {
        let store = GalleryStore::new();
        let detector = FixedDetector { faces: 1 };
        assert!(matches!(
            store
                .enroll("", &[frame(1)], &detector, &PixelEmbedder)
                .await,
            Err(EnrollmentError::EmptyLabel)
        ));
        assert!(matches!(
            store.enroll("alice", &[], &detector, &PixelEmbedder).await,
            Err(EnrollmentError::NoImages)
        ));
    }

    #[tokio::test]
    async fn test_snapshot_is_isolated_from_later_enrollment() {
        let store = GalleryStore::new();
        let detector = FixedDetector { faces: 1 };
        store
            .enroll("alice", &[frame(10)], &detector, &PixelEmbedder)
            .await
            .unwrap();

        let before = store.snapshot();
        store
            .enroll("bob", &[frame(20)], &detector, &PixelEmbedder)
            .await
            .unwrap();

        // The old snapshot still sees exactly one identity.
        assert_eq!(before.len(), 1);
        assert_eq!(store.snapshot().len(), 2);
    }
}
