//! Synthetic capabilities for smoke-testing the pipeline without a camera
//! or an inference engine.
//!
//! The embedder here is a real (if crude) descriptor function — per-cell
//! mean intensity over a fixed grid — so distances behave like distances:
//! identical subjects land at 0, different subjects land measurably apart,
//! and `--jitter` widens the spread to exercise the rejection threshold.

use async_trait::async_trait;
use gaze_core::{
    BoundingBox, DetectedFace, DetectionError, DetectionModel, Descriptor, EmbeddingError,
    EmbeddingModel, Frame, FrameSource,
};
use rand::Rng;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

const GRID_ROWS: usize = 8;
const GRID_COLS: usize = 16;
const DEFAULT_FRAME_SIZE: u32 = 160;

/// One reusable frame payload; served with a fresh timestamp per request.
struct Template {
    label: String,
    data: Arc<[u8]>,
    width: u32,
    height: u32,
}

/// Frame source that cycles through a fixed set of subject frames.
pub struct SyntheticSource {
    templates: Vec<Template>,
    requests: AtomicU64,
}

impl SyntheticSource {
    /// Generate `subjects` deterministic grayscale subjects.
    ///
    /// Each subject is a distinct base brightness plus a gradient, far
    /// enough apart in descriptor space that the default threshold
    /// separates them cleanly.
    pub fn generate(subjects: usize) -> Self {
        let size = DEFAULT_FRAME_SIZE;
        let templates = (0..subjects)
            .map(|k| {
                let base = 40 + (k as u32 * 160 / subjects.max(1) as u32) as u8;
                let mut data = vec![0u8; (size * size) as usize];
                for y in 0..size {
                    for x in 0..size {
                        let gradient = ((x * 64 / size) + (y * 32 / size)) as u8;
                        data[(y * size + x) as usize] = base.saturating_add(gradient);
                    }
                }
                Template {
                    label: format!("subject-{k}"),
                    data: data.into(),
                    width: size,
                    height: size,
                }
            })
            .collect();
        Self {
            templates,
            requests: AtomicU64::new(0),
        }
    }

    /// Load every decodable image in `dir` as a grayscale subject, labeled
    /// by file stem, in filename order.
    pub fn from_dir(dir: &Path) -> anyhow::Result<Self> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        paths.sort();

        let mut templates = Vec::new();
        for path in paths {
            let img = match image::open(&path) {
                Ok(img) => img.to_luma8(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping undecodable file");
                    continue;
                }
            };
            let label = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "unnamed".to_string());
            let (width, height) = img.dimensions();
            templates.push(Template {
                label,
                data: img.into_raw().into(),
                width,
                height,
            });
        }
        anyhow::ensure!(!templates.is_empty(), "no decodable images in {}", dir.display());
        Ok(Self {
            templates,
            requests: AtomicU64::new(0),
        })
    }

    pub fn labels(&self) -> Vec<String> {
        self.templates.iter().map(|t| t.label.clone()).collect()
    }

    /// A reference frame for enrolling subject `index`.
    pub fn reference_frame(&self, index: usize) -> Frame {
        let t = &self.templates[index];
        Frame {
            data: t.data.clone(),
            width: t.width,
            height: t.height,
            timestamp: Instant::now(),
            sequence: 0,
        }
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn current_frame(&self) -> Option<Frame> {
        let n = self.requests.fetch_add(1, Ordering::Relaxed);
        let t = &self.templates[n as usize % self.templates.len()];
        Some(Frame {
            data: t.data.clone(),
            width: t.width,
            height: t.height,
            timestamp: Instant::now(),
            sequence: n,
        })
    }
}

/// Detector that assumes one centered subject per frame, covering the
/// middle 80%. Good enough to exercise the pipeline end to end.
pub struct CenteredDetector;

#[async_trait]
impl DetectionModel for CenteredDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<DetectedFace>, DetectionError> {
        if frame.data.len() < (frame.width * frame.height) as usize {
            return Err(DetectionError::MalformedFrame(format!(
                "buffer {} bytes for {}x{} frame",
                frame.data.len(),
                frame.width,
                frame.height
            )));
        }
        let w = frame.width as f32;
        let h = frame.height as f32;
        Ok(vec![DetectedFace {
            bounding_box: BoundingBox {
                x: w * 0.1,
                y: h * 0.1,
                width: w * 0.8,
                height: h * 0.8,
                confidence: 0.99,
            },
            landmarks: None,
            timestamp: frame.timestamp,
        }])
    }
}

/// Embedder producing a 128-dim descriptor of per-cell mean intensities
/// (8x16 grid over the face region), each in [0, 1].
pub struct GridEmbedder {
    /// Uniform noise amplitude added per dimension.
    jitter: f32,
}

impl GridEmbedder {
    pub fn new(jitter: f32) -> Self {
        Self { jitter }
    }
}

#[async_trait]
impl EmbeddingModel for GridEmbedder {
    async fn embed(
        &self,
        frame: &Frame,
        face: &DetectedFace,
    ) -> Result<Descriptor, EmbeddingError> {
        let b = &face.bounding_box;
        let x0 = b.x as i64;
        let y0 = b.y as i64;
        let x1 = (b.x + b.width).ceil() as i64;
        let y1 = (b.y + b.height).ceil() as i64;
        if x0 < 0 || y0 < 0 || x1 > frame.width as i64 || y1 > frame.height as i64 || x1 <= x0 || y1 <= y0
        {
            return Err(EmbeddingError::RegionOutOfBounds {
                x: b.x,
                y: b.y,
                width: b.width,
                height: b.height,
                frame_width: frame.width,
                frame_height: frame.height,
            });
        }

        let (x0, y0, x1, y1) = (x0 as usize, y0 as usize, x1 as usize, y1 as usize);
        let region_w = x1 - x0;
        let region_h = y1 - y0;
        let stride = frame.width as usize;

        let mut values = Vec::with_capacity(GRID_ROWS * GRID_COLS);
        let mut rng = rand::thread_rng();
        for row in 0..GRID_ROWS {
            for col in 0..GRID_COLS {
                let cy0 = y0 + row * region_h / GRID_ROWS;
                let cy1 = y0 + (row + 1) * region_h / GRID_ROWS;
                let cx0 = x0 + col * region_w / GRID_COLS;
                let cx1 = x0 + (col + 1) * region_w / GRID_COLS;

                let mut sum = 0u64;
                let mut count = 0u64;
                for y in cy0..cy1.max(cy0 + 1) {
                    for x in cx0..cx1.max(cx0 + 1) {
                        sum += frame.data[y * stride + x] as u64;
                        count += 1;
                    }
                }
                let mut v = sum as f32 / count as f32 / 255.0;
                if self.jitter > 0.0 {
                    v += rng.gen_range(-self.jitter..=self.jitter);
                }
                values.push(v);
            }
        }
        Ok(Descriptor::new(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
    }

    #[test]
    fn test_grid_embedder_dimensionality() {
        runtime().block_on(async {
            let source = SyntheticSource::generate(1);
            let frame = source.reference_frame(0);
            let faces = CenteredDetector.detect(&frame).await.unwrap();
            let d = GridEmbedder::new(0.0).embed(&frame, &faces[0]).await.unwrap();
            assert_eq!(d.len(), GRID_ROWS * GRID_COLS);
            assert!(d.values.iter().all(|v| (0.0..=1.0).contains(v)));
        });
    }

    #[test]
    fn test_same_subject_embeds_at_distance_zero() {
        runtime().block_on(async {
            let source = SyntheticSource::generate(2);
            let embedder = GridEmbedder::new(0.0);
            let frame = source.reference_frame(1);
            let face = &CenteredDetector.detect(&frame).await.unwrap()[0];
            let a = embedder.embed(&frame, face).await.unwrap();
            let b = embedder.embed(&frame, face).await.unwrap();
            assert_relative_eq!(a.euclidean_distance(&b), 0.0);
        });
    }

    #[test]
    fn test_distinct_subjects_are_separated() {
        runtime().block_on(async {
            let source = SyntheticSource::generate(3);
            let embedder = GridEmbedder::new(0.0);
            let mut descriptors = Vec::new();
            for i in 0..3 {
                let frame = source.reference_frame(i);
                let face = &CenteredDetector.detect(&frame).await.unwrap()[0];
                descriptors.push(embedder.embed(&frame, face).await.unwrap());
            }
            for i in 0..3 {
                for j in (i + 1)..3 {
                    let d = descriptors[i].euclidean_distance(&descriptors[j]);
                    assert!(d > 0.6, "subjects {i} and {j} only {d} apart");
                }
            }
        });
    }

    #[test]
    fn test_out_of_bounds_region_is_rejected() {
        runtime().block_on(async {
            let frame = Frame::new(vec![0u8; 64], 8, 8, 0);
            let face = DetectedFace {
                bounding_box: BoundingBox {
                    x: 4.0,
                    y: 4.0,
                    width: 10.0,
                    height: 10.0,
                    confidence: 0.9,
                },
                landmarks: None,
                timestamp: frame.timestamp,
            };
            let err = GridEmbedder::new(0.0).embed(&frame, &face).await.unwrap_err();
            assert!(matches!(err, EmbeddingError::RegionOutOfBounds { .. }));
        });
    }

    #[test]
    fn test_source_cycles_subjects_with_increasing_sequence() {
        runtime().block_on(async {
            let source = SyntheticSource::generate(2);
            let a = source.current_frame().await.unwrap();
            let b = source.current_frame().await.unwrap();
            let c = source.current_frame().await.unwrap();
            assert!(a.sequence < b.sequence && b.sequence < c.sequence);
            // Two subjects: frame 0 and frame 2 share a payload.
            assert!(Arc::ptr_eq(&a.data, &c.data));
            assert!(!Arc::ptr_eq(&a.data, &b.data));
        });
    }
}
