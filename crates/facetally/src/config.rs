use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "facetally.toml";

/// Application configuration: defaults, then an optional TOML file, then
/// `FACETALLY_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Camera opened at startup (`/dev/video<N>`).
    pub camera_index: u32,
    /// Camera used by "Switch Camera".
    pub alt_camera_index: u32,
    /// SeetaFace cascade model file.
    pub cascade_model: PathBuf,
    /// Folder holding `<name>_<n>.png` samples and `labels.txt`.
    pub sample_dir: PathBuf,
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Trained LBPH model file.
    pub model_path: PathBuf,
    /// Annotated frame written on every recognition tick, if set.
    pub preview_path: Option<PathBuf>,
    /// Samples captured per enrollment.
    pub samples_per_enroll: usize,
    /// LBPH distance below which a face is accepted.
    pub recognition_threshold: f64,
    /// Capture loop period.
    pub tick_interval_ms: u64,
    /// Pause between enrollment samples.
    pub sample_interval_ms: u64,
    /// Frames tried before an enrollment gives up.
    pub max_enroll_frames: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_index: 0,
            alt_camera_index: 1,
            cascade_model: PathBuf::from("seeta_fd_frontal_v1.0.bin"),
            sample_dir: PathBuf::from("face_database"),
            db_path: PathBuf::from("faces.db"),
            model_path: PathBuf::from("trainer.json"),
            preview_path: None,
            samples_per_enroll: 50,
            recognition_threshold: facetally_core::RECOGNITION_THRESHOLD,
            tick_interval_ms: 10,
            sample_interval_ms: 100,
            max_enroll_frames: 500,
        }
    }
}

/// Optional overrides read from the TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    camera_index: Option<u32>,
    alt_camera_index: Option<u32>,
    cascade_model: Option<PathBuf>,
    sample_dir: Option<PathBuf>,
    db_path: Option<PathBuf>,
    model_path: Option<PathBuf>,
    preview_path: Option<PathBuf>,
    samples_per_enroll: Option<usize>,
    recognition_threshold: Option<f64>,
    tick_interval_ms: Option<u64>,
    sample_interval_ms: Option<u64>,
    max_enroll_frames: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl Config {
    /// Load from `$FACETALLY_CONFIG` (or `./facetally.toml` if present), then env.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        match std::env::var("FACETALLY_CONFIG") {
            Ok(path) => config.apply_file(Path::new(&path))?,
            Err(_) => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    config.apply_file(path)?;
                }
            }
        }
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        self.apply_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "applied config file");
        Ok(())
    }

    fn apply_toml(&mut self, text: &str) -> Result<(), toml::de::Error> {
        let file: FileConfig = toml::from_str(text)?;
        if let Some(v) = file.camera_index {
            self.camera_index = v;
        }
        if let Some(v) = file.alt_camera_index {
            self.alt_camera_index = v;
        }
        if let Some(v) = file.cascade_model {
            self.cascade_model = v;
        }
        if let Some(v) = file.sample_dir {
            self.sample_dir = v;
        }
        if let Some(v) = file.db_path {
            self.db_path = v;
        }
        if let Some(v) = file.model_path {
            self.model_path = v;
        }
        if file.preview_path.is_some() {
            self.preview_path = file.preview_path;
        }
        if let Some(v) = file.samples_per_enroll {
            self.samples_per_enroll = v;
        }
        if let Some(v) = file.recognition_threshold {
            self.recognition_threshold = v;
        }
        if let Some(v) = file.tick_interval_ms {
            self.tick_interval_ms = v;
        }
        if let Some(v) = file.sample_interval_ms {
            self.sample_interval_ms = v;
        }
        if let Some(v) = file.max_enroll_frames {
            self.max_enroll_frames = v;
        }
        Ok(())
    }

    fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        fn parsed_with<T: std::str::FromStr>(
            get: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            get(key).and_then(|v| v.parse().ok())
        }
        let path = |key: &str| get(key).map(PathBuf::from);

        if let Some(v) = parsed_with(&get, "FACETALLY_CAMERA_INDEX") {
            self.camera_index = v;
        }
        if let Some(v) = parsed_with(&get, "FACETALLY_ALT_CAMERA_INDEX") {
            self.alt_camera_index = v;
        }
        if let Some(v) = path("FACETALLY_CASCADE_MODEL") {
            self.cascade_model = v;
        }
        if let Some(v) = path("FACETALLY_SAMPLE_DIR") {
            self.sample_dir = v;
        }
        if let Some(v) = path("FACETALLY_DB_PATH") {
            self.db_path = v;
        }
        if let Some(v) = path("FACETALLY_MODEL_PATH") {
            self.model_path = v;
        }
        if let Some(v) = path("FACETALLY_PREVIEW_PATH") {
            self.preview_path = Some(v);
        }
        if let Some(v) = parsed_with(&get, "FACETALLY_SAMPLES_PER_ENROLL") {
            self.samples_per_enroll = v;
        }
        if let Some(v) = parsed_with(&get, "FACETALLY_RECOGNITION_THRESHOLD") {
            self.recognition_threshold = v;
        }
        if let Some(v) = parsed_with(&get, "FACETALLY_TICK_INTERVAL_MS") {
            self.tick_interval_ms = v;
        }
        if let Some(v) = parsed_with(&get, "FACETALLY_SAMPLE_INTERVAL_MS") {
            self.sample_interval_ms = v;
        }
        if let Some(v) = parsed_with(&get, "FACETALLY_MAX_ENROLL_FRAMES") {
            self.max_enroll_frames = v;
        }
    }

    /// Camera "Switch Camera" moves to from `current`.
    pub fn other_camera(&self, current: u32) -> u32 {
        if current == self.alt_camera_index {
            self.camera_index
        } else {
            self.alt_camera_index
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.samples_per_enroll, 50);
        assert_eq!(c.recognition_threshold, 80.0);
        assert_eq!(c.tick_interval_ms, 10);
        assert_eq!(c.db_path, PathBuf::from("faces.db"));
        assert_eq!(c.sample_dir, PathBuf::from("face_database"));
    }

    #[test]
    fn test_toml_overrides() {
        let mut c = Config::default();
        c.apply_toml("camera_index = 2\nsample_dir = \"/tmp/s\"\npreview_path = \"p.png\"\n")
            .unwrap();
        assert_eq!(c.camera_index, 2);
        assert_eq!(c.sample_dir, PathBuf::from("/tmp/s"));
        assert_eq!(c.preview_path, Some(PathBuf::from("p.png")));
        assert_eq!(c.alt_camera_index, 1);
    }

    #[test]
    fn test_toml_unknown_key_rejected() {
        let mut c = Config::default();
        assert!(c.apply_toml("camera = 2\n").is_err());
    }

    #[test]
    fn test_env_overrides_and_bad_values() {
        let env: HashMap<&str, &str> = [
            ("FACETALLY_SAMPLES_PER_ENROLL", "5"),
            ("FACETALLY_RECOGNITION_THRESHOLD", "not-a-number"),
            ("FACETALLY_DB_PATH", "/var/lib/f.db"),
        ]
        .into_iter()
        .collect();
        let mut c = Config::default();
        c.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.samples_per_enroll, 5);
        assert_eq!(c.recognition_threshold, 80.0);
        assert_eq!(c.db_path, PathBuf::from("/var/lib/f.db"));
    }

    #[test]
    fn test_other_camera_toggles() {
        let c = Config::default();
        assert_eq!(c.other_camera(0), 1);
        assert_eq!(c.other_camera(1), 0);
        assert_eq!(c.other_camera(5), 1);
    }
}
