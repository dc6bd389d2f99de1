//! Rebuild the LBPH model from the sample folder.

use std::path::Path;
use thiserror::Error;

use crate::labels::{LabelError, LabelMap};
use crate::lbph::{LbphError, LbphParams, LbphRecognizer};
use crate::samples::{SampleError, SampleStore};

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("samples: {0}")]
    Samples(#[from] SampleError),
    #[error("lbph: {0}")]
    Lbph(#[from] LbphError),
    #[error("labels: {0}")]
    Labels(#[from] LabelError),
}

/// A recognizer together with the names of its labels.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub recognizer: LbphRecognizer,
    pub labels: LabelMap,
}

impl TrainedModel {
    pub fn save(&self, model_path: &Path, labels_path: &Path) -> Result<(), TrainError> {
        self.recognizer.save(model_path)?;
        self.labels.save(labels_path)?;
        Ok(())
    }

    /// `Ok(None)` when no model has been saved yet.
    pub fn load(model_path: &Path, labels_path: &Path) -> Result<Option<Self>, TrainError> {
        if !model_path.exists() {
            return Ok(None);
        }
        let recognizer = LbphRecognizer::load(model_path)?;
        let labels = LabelMap::load(labels_path)?;
        Ok(Some(Self { recognizer, labels }))
    }
}

/// Train on every stored sample, one label per person (sorted, from 1).
///
/// Samples too small for the LBPH grid are skipped with a warning.
/// Returns `Ok(None)` when there is nothing to train on.
pub fn train_from_samples(
    store: &SampleStore,
    params: LbphParams,
) -> Result<Option<TrainedModel>, TrainError> {
    let samples = store.list()?;

    let mut labels = LabelMap::default();
    let mut images = Vec::with_capacity(samples.len());
    let mut label = 0i32;
    let mut current: Option<&str> = None;

    for sample in &samples {
        if current != Some(sample.person.as_str()) {
            label += 1;
            labels.insert(label, sample.person.clone());
            current = Some(sample.person.as_str());
        }
        let image = sample.load()?;
        let r2 = 2 * params.radius;
        if image.width() < r2 + params.grid_x || image.height() < r2 + params.grid_y {
            tracing::warn!(path = %sample.path.display(), "skipping undersized sample");
            continue;
        }
        images.push((image, label));
    }

    if images.is_empty() {
        tracing::info!("no samples to train on");
        return Ok(None);
    }

    let mut recognizer = LbphRecognizer::new(params);
    recognizer.train(images.iter().map(|(img, l)| (img, *l)))?;

    tracing::info!(
        samples = images.len(),
        persons = labels.len(),
        "recognizer trained"
    );
    Ok(Some(TrainedModel { recognizer, labels }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn pattern(seed: u32) -> GrayImage {
        GrayImage::from_fn(40, 40, |x, y| {
            let h = (x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503) ^ seed.wrapping_mul(97))
                .wrapping_mul(2_246_822_519);
            Luma([(h >> 24) as u8])
        })
    }

    #[test]
    fn test_empty_folder() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::open(dir.path()).unwrap();
        assert!(train_from_samples(&store, LbphParams::default()).unwrap().is_none());
    }

    #[test]
    fn test_one_label_per_person() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::open(dir.path()).unwrap();
        store.write_sample("bob", 1, &pattern(5)).unwrap();
        store.write_sample("alice", 1, &pattern(2)).unwrap();
        store.write_sample("alice", 2, &pattern(2)).unwrap();

        let model = train_from_samples(&store, LbphParams::default()).unwrap().unwrap();
        assert_eq!(model.labels.name(1), Some("alice"));
        assert_eq!(model.labels.name(2), Some("bob"));
        assert_eq!(model.recognizer.sample_count(), 3);

        let p = model.recognizer.predict(&pattern(5)).unwrap();
        assert_eq!(p.label, 2);
    }

    #[test]
    fn test_skips_undersized() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::open(dir.path()).unwrap();
        store.write_sample("tiny", 1, &GrayImage::from_pixel(4, 4, Luma([1]))).unwrap();
        assert!(train_from_samples(&store, LbphParams::default()).unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::open(dir.path().join("faces")).unwrap();
        store.write_sample("alice", 1, &pattern(2)).unwrap();
        let model = train_from_samples(&store, LbphParams::default()).unwrap().unwrap();

        let model_path = dir.path().join("trainer.json");
        assert!(TrainedModel::load(&model_path, &store.labels_path()).unwrap().is_none());

        model.save(&model_path, &store.labels_path()).unwrap();
        let loaded = TrainedModel::load(&model_path, &store.labels_path()).unwrap().unwrap();
        assert_eq!(loaded.labels, model.labels);
        assert_eq!(loaded.recognizer.sample_count(), 1);
    }
}
