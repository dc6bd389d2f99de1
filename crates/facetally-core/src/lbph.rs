//! Local Binary Pattern Histogram (LBPH) face recognizer.
//!
//! Each training face is reduced to a spatial histogram of circular LBP
//! codes; prediction is nearest neighbour under chi-square distance.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::Path;
use thiserror::Error;

use crate::types::Prediction;

// --- Named constants ---
const DEFAULT_RADIUS: u32 = 1;
const DEFAULT_NEIGHBORS: u32 = 8;
const DEFAULT_GRID: u32 = 8;
/// 2^16 bins per cell is already 64x the default; beyond that models explode.
const MAX_NEIGHBORS: u32 = 16;
const INTERP_EPSILON: f64 = 1e-9;

#[derive(Error, Debug)]
pub enum LbphError {
    #[error("no training samples")]
    EmptyTrainingSet,
    #[error("recognizer has not been trained")]
    NotTrained,
    #[error("image {width}x{height} too small for radius {radius} and {grid_x}x{grid_y} grid")]
    ImageTooSmall {
        width: u32,
        height: u32,
        radius: u32,
        grid_x: u32,
        grid_y: u32,
    },
    #[error("invalid LBPH parameters: {0}")]
    InvalidParams(String),
    #[error("model file: {0}")]
    Io(#[from] std::io::Error),
    #[error("model format: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LbphParams {
    pub radius: u32,
    pub neighbors: u32,
    pub grid_x: u32,
    pub grid_y: u32,
}

impl Default for LbphParams {
    fn default() -> Self {
        Self {
            radius: DEFAULT_RADIUS,
            neighbors: DEFAULT_NEIGHBORS,
            grid_x: DEFAULT_GRID,
            grid_y: DEFAULT_GRID,
        }
    }
}

impl LbphParams {
    fn validate(&self) -> Result<(), LbphError> {
        if self.radius == 0 {
            return Err(LbphError::InvalidParams("radius must be > 0".into()));
        }
        if self.neighbors == 0 || self.neighbors > MAX_NEIGHBORS {
            return Err(LbphError::InvalidParams(format!(
                "neighbors must be in 1..={MAX_NEIGHBORS}, got {}",
                self.neighbors
            )));
        }
        if self.grid_x == 0 || self.grid_y == 0 {
            return Err(LbphError::InvalidParams("grid must be at least 1x1".into()));
        }
        Ok(())
    }

    fn bins(&self) -> usize {
        1usize << self.neighbors
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LabelledHistogram {
    label: i32,
    histogram: Vec<f32>,
}

/// Trained LBPH model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LbphRecognizer {
    params: LbphParams,
    samples: Vec<LabelledHistogram>,
}

impl LbphRecognizer {
    pub fn new(params: LbphParams) -> Self {
        Self {
            params,
            samples: Vec::new(),
        }
    }

    pub fn params(&self) -> LbphParams {
        self.params
    }

    pub fn is_trained(&self) -> bool {
        !self.samples.is_empty()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Replace the model with histograms of `samples`.
    pub fn train<'a, I>(&mut self, samples: I) -> Result<(), LbphError>
    where
        I: IntoIterator<Item = (&'a GrayImage, i32)>,
    {
        self.params.validate()?;
        let mut trained = Vec::new();
        for (image, label) in samples {
            trained.push(LabelledHistogram {
                label,
                histogram: spatial_histogram(image, &self.params)?,
            });
        }
        if trained.is_empty() {
            return Err(LbphError::EmptyTrainingSet);
        }
        tracing::debug!(samples = trained.len(), "LBPH trained");
        self.samples = trained;
        Ok(())
    }

    /// Nearest training sample to `face`.
    pub fn predict(&self, face: &GrayImage) -> Result<Prediction, LbphError> {
        if self.samples.is_empty() {
            return Err(LbphError::NotTrained);
        }
        let query = spatial_histogram(face, &self.params)?;

        let mut best = Prediction {
            label: -1,
            distance: f64::MAX,
        };
        for sample in &self.samples {
            let distance = chi_square(&sample.histogram, &query);
            if distance < best.distance {
                best = Prediction {
                    label: sample.label,
                    distance,
                };
            }
        }
        Ok(best)
    }

    /// Write the model as JSON, replacing `path` atomically.
    pub fn save(&self, path: &Path) -> Result<(), LbphError> {
        let tmp = path.with_extension("tmp");
        let json = serde_json::to_vec(self)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, LbphError> {
        let bytes = std::fs::read(path)?;
        let model: Self = serde_json::from_slice(&bytes)?;
        model.params.validate()?;
        Ok(model)
    }
}

/// Circular LBP codes with bilinear interpolation. Output is
/// `(width - 2r) x (height - 2r)`, row-major.
fn lbp_codes(image: &GrayImage, params: &LbphParams) -> (Vec<u32>, usize, usize) {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let r = params.radius as usize;
    let out_w = w - 2 * r;
    let out_h = h - 2 * r;
    let src = image.as_raw();
    let px = |y: usize, x: usize| src[y * w + x] as f64;

    let mut codes = vec![0u32; out_w * out_h];
    for n in 0..params.neighbors {
        let angle = 2.0 * PI * n as f64 / params.neighbors as f64;
        let sx = params.radius as f64 * angle.cos();
        let sy = -(params.radius as f64) * angle.sin();

        let fx = sx.floor();
        let fy = sy.floor();
        let cx = sx.ceil();
        let cy = sy.ceil();
        let tx = sx - fx;
        let ty = sy - fy;
        let w1 = (1.0 - tx) * (1.0 - ty);
        let w2 = tx * (1.0 - ty);
        let w3 = (1.0 - tx) * ty;
        let w4 = tx * ty;

        // Offsets are within [-r, r], so these never leave the image.
        let (fx, fy, cx, cy) = (fx as isize, fy as isize, cx as isize, cy as isize);
        for y in r..h - r {
            for x in r..w - r {
                let at = |dy: isize, dx: isize| {
                    px((y as isize + dy) as usize, (x as isize + dx) as usize)
                };
                let t = w1 * at(fy, fx) + w2 * at(fy, cx) + w3 * at(cy, fx) + w4 * at(cy, cx);
                let center = px(y, x);
                if t > center || (t - center).abs() < INTERP_EPSILON {
                    codes[(y - r) * out_w + (x - r)] |= 1 << n;
                }
            }
        }
    }
    (codes, out_w, out_h)
}

/// Concatenated per-cell normalised histograms over a `grid_x` x `grid_y` grid.
fn spatial_histogram(image: &GrayImage, params: &LbphParams) -> Result<Vec<f32>, LbphError> {
    let r2 = 2 * params.radius;
    if image.width() < r2 + params.grid_x || image.height() < r2 + params.grid_y {
        return Err(LbphError::ImageTooSmall {
            width: image.width(),
            height: image.height(),
            radius: params.radius,
            grid_x: params.grid_x,
            grid_y: params.grid_y,
        });
    }

    let (codes, code_w, code_h) = lbp_codes(image, params);
    let bins = params.bins();
    let (gx, gy) = (params.grid_x as usize, params.grid_y as usize);
    let cell_w = code_w / gx;
    let cell_h = code_h / gy;
    let cell_area = (cell_w * cell_h) as f32;

    let mut hist = vec![0f32; gx * gy * bins];
    for row in 0..gy {
        for col in 0..gx {
            let base = (row * gx + col) * bins;
            for y in row * cell_h..(row + 1) * cell_h {
                for x in col * cell_w..(col + 1) * cell_w {
                    hist[base + codes[y * code_w + x] as usize] += 1.0;
                }
            }
            for v in &mut hist[base..base + bins] {
                *v /= cell_area;
            }
        }
    }
    Ok(hist)
}

/// Alternative chi-square: `2 * sum((a - b)^2 / (a + b))`.
fn chi_square(a: &[f32], b: &[f32]) -> f64 {
    let mut sum = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let denom = x as f64 + y as f64;
        if denom > f64::EPSILON {
            let diff = x as f64 - y as f64;
            sum += diff * diff / denom;
        }
    }
    2.0 * sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gradient(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]))
    }

    fn checker(w: u32, h: u32, cell: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            if (x / cell + y / cell) % 2 == 0 {
                Luma([30])
            } else {
                Luma([220])
            }
        })
    }

    #[test]
    fn test_uniform_image_codes_all_ones() {
        // Every neighbour equals the centre, so every bit is set.
        let img = GrayImage::from_pixel(5, 5, Luma([100]));
        let (codes, w, h) = lbp_codes(&img, &LbphParams::default());
        assert_eq!((w, h), (3, 3));
        assert!(codes.iter().all(|&c| c == 0xFF));
    }

    #[test]
    fn test_bright_centre_code_zero() {
        let mut img = GrayImage::from_pixel(3, 3, Luma([10]));
        img.put_pixel(1, 1, Luma([200]));
        let (codes, _, _) = lbp_codes(&img, &LbphParams::default());
        assert_eq!(codes, vec![0]);
    }

    #[test]
    fn test_cells_are_normalised() {
        let params = LbphParams::default();
        let hist = spatial_histogram(&gradient(40, 40), &params).unwrap();
        assert_eq!(hist.len(), 64 * 256);
        for cell in hist.chunks(params.bins()) {
            let total: f32 = cell.iter().sum();
            assert!((total - 1.0).abs() < 1e-4, "cell sum {total}");
        }
    }

    #[test]
    fn test_too_small() {
        let err = spatial_histogram(&gradient(9, 40), &LbphParams::default()).unwrap_err();
        assert!(matches!(err, LbphError::ImageTooSmall { width: 9, .. }));
    }

    #[test]
    fn test_chi_square_properties() {
        let a = vec![0.5f32, 0.5, 0.0];
        let b = vec![0.0f32, 0.5, 0.5];
        assert_eq!(chi_square(&a, &a), 0.0);
        assert!((chi_square(&a, &b) - 2.0).abs() < 1e-9);
        assert_eq!(chi_square(&a, &b), chi_square(&b, &a));
    }

    #[test]
    fn test_predict_untrained() {
        let rec = LbphRecognizer::new(LbphParams::default());
        assert!(matches!(rec.predict(&gradient(40, 40)), Err(LbphError::NotTrained)));
    }

    #[test]
    fn test_train_empty() {
        let mut rec = LbphRecognizer::new(LbphParams::default());
        let none: Vec<(&GrayImage, i32)> = Vec::new();
        assert!(matches!(rec.train(none), Err(LbphError::EmptyTrainingSet)));
    }

    #[test]
    fn test_invalid_params() {
        let mut rec = LbphRecognizer::new(LbphParams { neighbors: 24, ..Default::default() });
        let img = gradient(40, 40);
        assert!(matches!(rec.train([(&img, 1)]), Err(LbphError::InvalidParams(_))));
    }

    #[test]
    fn test_predict_nearest_label() {
        let a = gradient(48, 48);
        let b = checker(48, 48, 6);
        let mut rec = LbphRecognizer::new(LbphParams::default());
        rec.train([(&a, 1), (&b, 2)]).unwrap();
        assert_eq!(rec.sample_count(), 2);

        let p = rec.predict(&a).unwrap();
        assert_eq!(p.label, 1);
        assert!(p.distance < 1e-9);

        let p = rec.predict(&b).unwrap();
        assert_eq!(p.label, 2);
    }

    #[test]
    fn test_predict_different_sizes() {
        let mut rec = LbphRecognizer::new(LbphParams::default());
        rec.train([(&checker(60, 60, 6), 1), (&gradient(60, 60), 2)]).unwrap();
        let p = rec.predict(&checker(66, 66, 6)).unwrap();
        assert_eq!(p.label, 1);
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trainer.json");
        let img = gradient(32, 32);
        let mut rec = LbphRecognizer::new(LbphParams::default());
        rec.train([(&img, 3)]).unwrap();
        rec.save(&path).unwrap();

        let loaded = LbphRecognizer::load(&path).unwrap();
        assert_eq!(loaded.params(), rec.params());
        assert_eq!(loaded.predict(&img).unwrap().label, 3);
        assert!(!path.with_extension("tmp").exists());
    }
}
