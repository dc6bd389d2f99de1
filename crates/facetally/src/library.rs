//! Enrolled-face library: record store, sample folder and trained model files.

use facetally_core::samples::SampleError;
use facetally_core::trainer::TrainError;
use facetally_core::{train_from_samples, LbphParams, SampleStore, TrainedModel};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::Config;
use crate::store::{FaceStore, StoreError};

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("samples: {0}")]
    Samples(#[from] SampleError),
    #[error("training: {0}")]
    Train(#[from] TrainError),
    #[error("removing {path}: {source}")]
    Remove {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// What a single-person delete removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removed {
    pub rows: usize,
    pub images: usize,
}

pub struct Library {
    pub store: FaceStore,
    pub samples: SampleStore,
    model_path: PathBuf,
    params: LbphParams,
}

impl Library {
    pub fn open(config: &Config) -> Result<Self, LibraryError> {
        Ok(Self {
            store: FaceStore::open(&config.db_path)?,
            samples: SampleStore::open(&config.sample_dir)?,
            model_path: config.model_path.clone(),
            params: LbphParams::default(),
        })
    }

    pub fn from_parts(store: FaceStore, samples: SampleStore, model_path: PathBuf) -> Self {
        Self {
            store,
            samples,
            model_path,
            params: LbphParams::default(),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Previously saved model, if any.
    pub fn load_model(&self) -> Result<Option<TrainedModel>, LibraryError> {
        Ok(TrainedModel::load(&self.model_path, &self.samples.labels_path())?)
    }

    /// Rebuild the model from the sample folder and persist it. With no
    /// samples left the model and labels files are removed.
    pub fn retrain(&self) -> Result<Option<TrainedModel>, LibraryError> {
        match train_from_samples(&self.samples, self.params)? {
            Some(model) => {
                model.save(&self.model_path, &self.samples.labels_path())?;
                tracing::info!(
                    path = %self.model_path.display(),
                    persons = model.labels.len(),
                    "model saved"
                );
                Ok(Some(model))
            }
            None => {
                self.remove_model_files()?;
                Ok(None)
            }
        }
    }

    /// Record a newly enrolled person, unless a row with that name exists.
    pub fn register(&self, name: &str) -> Result<bool, LibraryError> {
        if self.store.contains(name)? {
            return Ok(false);
        }
        self.store.add_person(name)?;
        Ok(true)
    }

    /// Delete one person's row and samples, then retrain.
    pub fn delete_person(&self, name: &str) -> Result<(Removed, Option<TrainedModel>), LibraryError> {
        let rows = self.store.delete_person(name)?;
        let images = self.samples.remove_person(name)?;
        let model = self.retrain()?;
        Ok((Removed { rows, images }, model))
    }

    /// Delete every row, sample, the labels file and the model.
    pub fn delete_all(&self) -> Result<Removed, LibraryError> {
        let rows = self.store.delete_all()?;
        let images = self.samples.remove_all()?;
        self.remove_model_files()?;
        Ok(Removed { rows, images })
    }

    fn remove_model_files(&self) -> Result<(), LibraryError> {
        for path in [self.model_path.clone(), self.samples.labels_path()] {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(LibraryError::Remove {
                        path: path.display().to_string(),
                        source,
                    })
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn library(dir: &Path) -> Library {
        Library::from_parts(
            FaceStore::open_in_memory().unwrap(),
            SampleStore::open(dir.join("faces")).unwrap(),
            dir.join("trainer.json"),
        )
    }

    fn face(seed: u8) -> GrayImage {
        GrayImage::from_fn(32, 32, |x, y| Luma([(x as u8).wrapping_mul(seed) ^ (y as u8)]))
    }

    #[test]
    fn test_register_once() {
        let dir = tempfile::tempdir().unwrap();
        let lib = library(dir.path());
        assert!(lib.register("alice").unwrap());
        assert!(!lib.register("alice").unwrap());
        assert_eq!(lib.store.face_count().unwrap(), 1);
    }

    #[test]
    fn test_retrain_writes_and_clears_files() {
        let dir = tempfile::tempdir().unwrap();
        let lib = library(dir.path());
        lib.samples.write_sample("alice", 1, &face(3)).unwrap();

        assert!(lib.retrain().unwrap().is_some());
        assert!(lib.model_path().exists());
        assert!(lib.samples.labels_path().exists());
        assert!(lib.load_model().unwrap().is_some());

        lib.samples.remove_person("alice").unwrap();
        assert!(lib.retrain().unwrap().is_none());
        assert!(!lib.model_path().exists());
        assert!(lib.load_model().unwrap().is_none());
    }

    #[test]
    fn test_delete_person_retrains_without_them() {
        let dir = tempfile::tempdir().unwrap();
        let lib = library(dir.path());
        for (name, seed) in [("alice", 3), ("bob", 7)] {
            lib.register(name).unwrap();
            lib.samples.write_sample(name, 1, &face(seed)).unwrap();
        }
        lib.retrain().unwrap();

        let (removed, model) = lib.delete_person("alice").unwrap();
        assert_eq!(removed, Removed { rows: 1, images: 1 });
        let model = model.unwrap();
        assert_eq!(model.labels.len(), 1);
        assert_eq!(model.labels.name(1), Some("bob"));
        assert_eq!(lib.store.names().unwrap(), vec!["bob"]);
    }

    #[test]
    fn test_delete_all() {
        let dir = tempfile::tempdir().unwrap();
        let lib = library(dir.path());
        lib.register("alice").unwrap();
        lib.samples.write_sample("alice", 1, &face(3)).unwrap();
        lib.samples.write_sample("alice", 2, &face(3)).unwrap();
        lib.retrain().unwrap();

        assert_eq!(lib.delete_all().unwrap(), Removed { rows: 1, images: 2 });
        assert!(!lib.model_path().exists());
        assert!(!lib.samples.labels_path().exists());
        assert_eq!(lib.store.face_count().unwrap(), 0);
    }
}
