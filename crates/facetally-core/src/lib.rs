//! Face detection and LBPH recognition.
//!
//! Detection uses a SeetaFace funnel cascade (`rustface`); recognition uses
//! local binary pattern histograms trained from on-disk sample crops.

pub mod detector;
pub mod labels;
pub mod lbph;
pub mod samples;
pub mod trainer;
pub mod types;

pub use detector::{CascadeDetector, DetectorParams, FaceDetector};
pub use labels::LabelMap;
pub use lbph::{LbphParams, LbphRecognizer};
pub use samples::SampleStore;
pub use trainer::{train_from_samples, TrainedModel};
pub use types::{FaceRect, Prediction, Verdict, RECOGNITION_THRESHOLD};

use image::GrayImage;

/// Crop `rect` (clamped to the frame) out of a grayscale frame.
pub fn crop_face(frame: &GrayImage, rect: &FaceRect) -> Option<GrayImage> {
    let r = rect.clamp_to(frame.width(), frame.height())?;
    Some(image::imageops::crop_imm(frame, r.x, r.y, r.width, r.height).to_image())
}
