//! On-disk face sample folder.
//!
//! Samples are grayscale crops named `<name>_<n>.png`; the folder also holds
//! `labels.txt` for the trained model.

use image::GrayImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

const LABELS_FILE: &str = "labels.txt";
const SAMPLE_EXTENSIONS: [&str; 2] = ["png", "jpg"];

#[derive(Error, Debug)]
pub enum SampleError {
    #[error("sample folder {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sample image {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid person name {0:?}")]
    InvalidName(String),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SampleError + '_ {
    move |source| SampleError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// A sample image file belonging to one person.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SampleFile {
    pub person: String,
    pub index: u32,
    pub path: PathBuf,
}

impl SampleFile {
    pub fn load(&self) -> Result<GrayImage, SampleError> {
        image::open(&self.path)
            .map(|img| img.into_luma8())
            .map_err(|source| SampleError::Image {
                path: self.path.display().to_string(),
                source,
            })
    }
}

/// Split `alice_12.png` into `("alice", 12)`. `None` for non-sample files.
pub fn parse_sample_name(file_name: &str) -> Option<(String, u32)> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if !SAMPLE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
        return None;
    }
    let (person, index) = stem.rsplit_once('_')?;
    if person.is_empty() {
        return None;
    }
    let index = index.parse().ok()?;
    Some((person.to_string(), index))
}

pub struct SampleStore {
    dir: PathBuf,
}

impl SampleStore {
    /// Open the sample folder, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SampleError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn labels_path(&self) -> PathBuf {
        self.dir.join(LABELS_FILE)
    }

    /// Names become part of a file name and a `labels.txt` line, so path
    /// separators and control characters are refused.
    pub fn validate_name(name: &str) -> Result<(), SampleError> {
        let trimmed = name.trim();
        if trimmed.is_empty()
            || trimmed != name
            || name.contains(['/', '\\'])
            || name.chars().any(char::is_control)
            || name == "."
            || name == ".."
        {
            return Err(SampleError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    pub fn sample_path(&self, name: &str, index: u32) -> PathBuf {
        self.dir.join(format!("{name}_{index}.png"))
    }

    pub fn write_sample(&self, name: &str, index: u32, face: &GrayImage) -> Result<PathBuf, SampleError> {
        Self::validate_name(name)?;
        let path = self.sample_path(name, index);
        face.save(&path).map_err(|source| SampleError::Image {
            path: path.display().to_string(),
            source,
        })?;
        Ok(path)
    }

    /// All sample files, sorted by person then index.
    pub fn list(&self) -> Result<Vec<SampleFile>, SampleError> {
        let mut samples = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(io_err(&self.dir))? {
            let entry = entry.map_err(io_err(&self.dir))?;
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if let Some((person, index)) = parse_sample_name(&file_name) {
                samples.push(SampleFile {
                    person,
                    index,
                    path: entry.path(),
                });
            }
        }
        samples.sort();
        Ok(samples)
    }

    /// Distinct person names with at least one sample, sorted.
    pub fn persons(&self) -> Result<Vec<String>, SampleError> {
        let mut names: Vec<String> = self.list()?.into_iter().map(|s| s.person).collect();
        names.dedup();
        Ok(names)
    }

    pub fn samples_of(&self, name: &str) -> Result<Vec<SampleFile>, SampleError> {
        Ok(self.list()?.into_iter().filter(|s| s.person == name).collect())
    }

    /// First sample of exactly this person, used as the delete preview.
    pub fn preview(&self, name: &str) -> Result<Option<PathBuf>, SampleError> {
        Ok(self.samples_of(name)?.into_iter().next().map(|s| s.path))
    }

    /// Next free sample index for `name`.
    pub fn next_index(&self, name: &str) -> Result<u32, SampleError> {
        Ok(self
            .samples_of(name)?
            .iter()
            .map(|s| s.index)
            .max()
            .map_or(1, |i| i + 1))
    }

    pub fn remove_person(&self, name: &str) -> Result<usize, SampleError> {
        let samples = self.samples_of(name)?;
        for sample in &samples {
            std::fs::remove_file(&sample.path).map_err(io_err(&sample.path))?;
        }
        tracing::debug!(name, removed = samples.len(), "removed person samples");
        Ok(samples.len())
    }

    /// Remove every sample and the labels file.
    pub fn remove_all(&self) -> Result<usize, SampleError> {
        let samples = self.list()?;
        for sample in &samples {
            std::fs::remove_file(&sample.path).map_err(io_err(&sample.path))?;
        }
        let labels = self.labels_path();
        match std::fs::remove_file(&labels) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(&labels)(e)),
        }
        Ok(samples.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn face() -> GrayImage {
        GrayImage::from_pixel(24, 24, Luma([90]))
    }

    #[test]
    fn test_parse_sample_name() {
        assert_eq!(parse_sample_name("alice_12.png"), Some(("alice".into(), 12)));
        assert_eq!(parse_sample_name("mary_ann_3.jpg"), Some(("mary_ann".into(), 3)));
        assert_eq!(parse_sample_name("labels.txt"), None);
        assert_eq!(parse_sample_name("alice.png"), None);
        assert_eq!(parse_sample_name("alice_x.png"), None);
        assert_eq!(parse_sample_name("_4.png"), None);
    }

    #[test]
    fn test_validate_name() {
        assert!(SampleStore::validate_name("alice").is_ok());
        assert!(SampleStore::validate_name("Mary Ann").is_ok());
        assert!(SampleStore::validate_name("").is_err());
        assert!(SampleStore::validate_name(" bob").is_err());
        assert!(SampleStore::validate_name("../etc").is_err());
        assert!(SampleStore::validate_name("ann\nbob").is_err());
        assert!(SampleStore::validate_name("ann\rbob").is_err());
        assert!(SampleStore::validate_name("a\0b").is_err());
    }

    #[test]
    fn test_multiline_name_never_reaches_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::open(dir.path()).unwrap();
        let err = store.write_sample("ann\nbob", 1, &face()).unwrap_err();
        assert!(matches!(err, SampleError::InvalidName(_)));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_write_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::open(dir.path().join("faces")).unwrap();
        store.write_sample("bob", 2, &face()).unwrap();
        store.write_sample("bob", 1, &face()).unwrap();
        store.write_sample("alice", 1, &face()).unwrap();
        std::fs::write(store.labels_path(), "alice:1\n").unwrap();

        let listed = store.list().unwrap();
        let keys: Vec<(&str, u32)> = listed.iter().map(|s| (s.person.as_str(), s.index)).collect();
        assert_eq!(keys, vec![("alice", 1), ("bob", 1), ("bob", 2)]);
        assert_eq!(store.persons().unwrap(), vec!["alice", "bob"]);
        assert_eq!(store.next_index("bob").unwrap(), 3);
        assert_eq!(store.next_index("carol").unwrap(), 1);
        assert_eq!(listed[0].load().unwrap().dimensions(), (24, 24));
    }

    #[test]
    fn test_remove_person_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::open(dir.path()).unwrap();
        store.write_sample("al", 1, &face()).unwrap();
        store.write_sample("alice", 1, &face()).unwrap();
        store.write_sample("alice", 2, &face()).unwrap();

        assert_eq!(store.remove_person("al").unwrap(), 1);
        assert_eq!(store.persons().unwrap(), vec!["alice"]);
        assert_eq!(
            store.preview("alice").unwrap(),
            Some(store.sample_path("alice", 1))
        );
        assert_eq!(store.preview("al").unwrap(), None);
    }

    #[test]
    fn test_remove_all() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::open(dir.path()).unwrap();
        store.write_sample("alice", 1, &face()).unwrap();
        store.write_sample("bob", 1, &face()).unwrap();
        std::fs::write(store.labels_path(), "alice:1\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        assert_eq!(store.remove_all().unwrap(), 2);
        assert!(store.list().unwrap().is_empty());
        assert!(!store.labels_path().exists());
        assert!(dir.path().join("notes.txt").exists());
    }
}
