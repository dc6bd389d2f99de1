use serde::{Deserialize, Serialize};

use crate::labels::LabelMap;

/// LBPH distance below which a prediction is accepted as a known identity.
pub const RECOGNITION_THRESHOLD: f64 = 80.0;

/// Rectangle around a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Detector score (higher = more face-like).
    pub score: f64,
}

impl FaceRect {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Intersect with a `width` x `height` frame. Returns `None` if nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<FaceRect> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.width.min(width - self.x);
        let h = self.height.min(height - self.y);
        if w == 0 || h == 0 {
            return None;
        }
        Some(FaceRect {
            width: w,
            height: h,
            ..*self
        })
    }
}

/// Nearest training sample for a probe face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: i32,
    /// Chi-square histogram distance. Lower = more similar.
    pub distance: f64,
}

/// Outcome of thresholding a prediction against the label map.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Known { name: String, distance: f64 },
    Unknown { distance: Option<f64> },
}

impl Verdict {
    /// Accept `prediction` iff its distance is under `threshold` and the label has a name.
    pub fn judge(prediction: Option<Prediction>, labels: &LabelMap, threshold: f64) -> Self {
        match prediction {
            Some(p) if p.distance < threshold => match labels.name(p.label) {
                Some(name) => Verdict::Known {
                    name: name.to_string(),
                    distance: p.distance,
                },
                None => Verdict::Unknown {
                    distance: Some(p.distance),
                },
            },
            Some(p) => Verdict::Unknown {
                distance: Some(p.distance),
            },
            None => Verdict::Unknown { distance: None },
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Verdict::Known { .. })
    }

    /// Text drawn next to the face box.
    pub fn display_name(&self) -> &str {
        match self {
            Verdict::Known { name, .. } => name,
            Verdict::Unknown { .. } => "Unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: u32, y: u32, w: u32, h: u32) -> FaceRect {
        FaceRect { x, y, width: w, height: h, score: 1.0 }
    }

    fn labels() -> LabelMap {
        let mut map = LabelMap::default();
        map.insert(1, "alice");
        map
    }

    #[test]
    fn test_clamp_inside() {
        let r = rect(10, 10, 20, 20);
        assert_eq!(r.clamp_to(100, 100), Some(r));
    }

    #[test]
    fn test_clamp_overhanging_edge() {
        let r = rect(90, 95, 20, 20).clamp_to(100, 100).unwrap();
        assert_eq!((r.width, r.height), (10, 5));
    }

    #[test]
    fn test_clamp_outside() {
        assert!(rect(100, 0, 10, 10).clamp_to(100, 100).is_none());
        assert!(rect(0, 0, 0, 10).clamp_to(100, 100).is_none());
    }

    #[test]
    fn test_verdict_accepts_below_threshold() {
        let p = Prediction { label: 1, distance: 42.0 };
        let v = Verdict::judge(Some(p), &labels(), RECOGNITION_THRESHOLD);
        assert_eq!(v, Verdict::Known { name: "alice".into(), distance: 42.0 });
        assert_eq!(v.display_name(), "alice");
    }

    #[test]
    fn test_verdict_rejects_at_threshold() {
        let p = Prediction { label: 1, distance: RECOGNITION_THRESHOLD };
        let v = Verdict::judge(Some(p), &labels(), RECOGNITION_THRESHOLD);
        assert!(!v.is_known());
        assert_eq!(v.display_name(), "Unknown");
    }

    #[test]
    fn test_verdict_unmapped_label_is_unknown() {
        let p = Prediction { label: 7, distance: 1.0 };
        let v = Verdict::judge(Some(p), &labels(), RECOGNITION_THRESHOLD);
        assert_eq!(v, Verdict::Unknown { distance: Some(1.0) });
    }

    #[test]
    fn test_verdict_no_prediction() {
        let v = Verdict::judge(None, &labels(), RECOGNITION_THRESHOLD);
        assert_eq!(v, Verdict::Unknown { distance: None });
    }
}
