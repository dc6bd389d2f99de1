//! Cascade face detector backed by `rustface` (SeetaFace funnel-structured cascade).
//!
//! The model file is external; download `seeta_fd_frontal_v1.0.bin` and point
//! the config at it.

use crate::types::FaceRect;
use image::GrayImage;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

// --- Named constants ---
/// Smallest face the cascade accepts (rustface panics below this).
const MIN_FACE_SIZE_FLOOR: u32 = 20;
const DEFAULT_SCORE_THRESHOLD: f64 = 2.0;
/// Pyramid downscale per level, ~1/1.3.
const DEFAULT_PYRAMID_SCALE: f32 = 0.77;
const DEFAULT_WINDOW_STEP: u32 = 4;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("cascade model not found: {0}: download seeta_fd_frontal_v1.0.bin")]
    ModelNotFound(String),
    #[error("failed to read cascade model {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Pluggable face detection backend.
pub trait FaceDetector: Send {
    /// Detect faces in a grayscale frame, sorted by descending score and
    /// clamped to the frame bounds.
    fn detect(&self, gray: &GrayImage) -> Vec<FaceRect>;
}

/// Tuning for the cascade sliding-window search.
#[derive(Debug, Clone, Copy)]
pub struct DetectorParams {
    pub min_face_size: u32,
    pub score_threshold: f64,
    pub pyramid_scale: f32,
    pub window_step: u32,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            min_face_size: MIN_FACE_SIZE_FLOOR,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            pyramid_scale: DEFAULT_PYRAMID_SCALE,
            window_step: DEFAULT_WINDOW_STEP,
        }
    }
}

impl DetectorParams {
    /// Clamp values into the ranges the cascade accepts.
    fn sanitized(self) -> Self {
        Self {
            min_face_size: self.min_face_size.max(MIN_FACE_SIZE_FLOOR),
            score_threshold: if self.score_threshold > 0.0 {
                self.score_threshold
            } else {
                DEFAULT_SCORE_THRESHOLD
            },
            pyramid_scale: self.pyramid_scale.clamp(0.01, 0.99),
            window_step: self.window_step.max(1),
        }
    }
}

pub struct CascadeDetector {
    model: rustface::Model,
    params: DetectorParams,
}

impl CascadeDetector {
    /// Load the cascade model from the given path.
    pub fn load(model_path: &Path, params: DetectorParams) -> Result<Self, DetectorError> {
        let shown = model_path.display().to_string();
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(shown));
        }

        let file = File::open(model_path).map_err(|source| DetectorError::Io {
            path: shown.clone(),
            source,
        })?;
        let model = rustface::read_model(BufReader::new(file)).map_err(|source| {
            DetectorError::Io {
                path: shown.clone(),
                source,
            }
        })?;

        let params = params.sanitized();
        tracing::info!(
            path = %shown,
            min_face_size = params.min_face_size,
            score_threshold = params.score_threshold,
            pyramid_scale = params.pyramid_scale,
            "loaded cascade model"
        );

        Ok(Self { model, params })
    }
}

impl FaceDetector for CascadeDetector {
    fn detect(&self, gray: &GrayImage) -> Vec<FaceRect> {
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return Vec::new();
        }

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(self.params.min_face_size);
        detector.set_score_thresh(self.params.score_threshold);
        detector.set_pyramid_scale_factor(self.params.pyramid_scale);
        detector.set_slide_window_step(self.params.window_step, self.params.window_step);

        let faces = detector.detect(&rustface::ImageData::new(gray.as_raw(), width, height));

        let mut rects: Vec<FaceRect> = faces
            .iter()
            .filter_map(|face| {
                let bbox = face.bbox();
                from_signed(bbox.x(), bbox.y(), bbox.width(), bbox.height(), face.score())
                    .and_then(|r| r.clamp_to(width, height))
            })
            .collect();

        sort_by_score(&mut rects);
        tracing::trace!(count = rects.len(), "cascade detections");
        rects
    }
}

/// Convert a rectangle that may start left of / above the frame.
fn from_signed(x: i32, y: i32, width: u32, height: u32, score: f64) -> Option<FaceRect> {
    let cut_x = x.min(0).unsigned_abs();
    let cut_y = y.min(0).unsigned_abs();
    if cut_x >= width || cut_y >= height {
        return None;
    }
    Some(FaceRect {
        x: x.max(0) as u32,
        y: y.max(0) as u32,
        width: width - cut_x,
        height: height - cut_y,
        score,
    })
}

fn sort_by_score(rects: &mut [FaceRect]) {
    rects.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// The face with the largest area, if any.
pub fn largest_face(faces: &[FaceRect]) -> Option<FaceRect> {
    faces.iter().copied().max_by_key(FaceRect::area)
}
