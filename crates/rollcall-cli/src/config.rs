use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Runtime configuration.
///
/// Resolved in three layers: built-in defaults, then an optional TOML file,
/// then `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory of `<name>.jpg` reference photos.
    pub known_faces_dir: PathBuf,
    /// CSV attendance log.
    pub log_path: PathBuf,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Maximum Euclidean distance for a positive match.
    pub tolerance: f32,
    /// Minimum seconds between two log rows for the same person.
    pub cooldown_secs: u64,
    /// Frames discarded before capturing a reference photo (auto-exposure settling).
    pub warmup_frames: usize,
    /// Frames tried when looking for a non-dark reference photo.
    pub capture_attempts: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            known_faces_dir: PathBuf::from("known_faces"),
            log_path: PathBuf::from("face_recognition_log.csv"),
            model_dir: rollcall_core::default_model_dir(),
            tolerance: rollcall_core::matcher::DEFAULT_TOLERANCE,
            cooldown_secs: rollcall_core::ledger::COOLDOWN_WINDOW_SECS as u64,
            warmup_frames: 4,
            capture_attempts: 30,
        }
    }
}

impl Config {
    /// Load from `path` (or `ROLLCALL_CONFIG` when `path` is `None`), then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("ROLLCALL_CONFIG").ok().map(PathBuf::from));

        let mut config = match file {
            Some(file) => Self::from_file(&file)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Apply `ROLLCALL_*` overrides. Unparseable numbers keep the current value.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("ROLLCALL_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = var("ROLLCALL_KNOWN_FACES_DIR") {
            self.known_faces_dir = PathBuf::from(v);
        }
        if let Some(v) = var("ROLLCALL_LOG_PATH") {
            self.log_path = PathBuf::from(v);
        }
        if let Some(v) = var("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        self.tolerance = parsed(&var, "ROLLCALL_TOLERANCE", self.tolerance);
        self.cooldown_secs = parsed(&var, "ROLLCALL_COOLDOWN_SECS", self.cooldown_secs);
        self.warmup_frames = parsed(&var, "ROLLCALL_WARMUP_FRAMES", self.warmup_frames);
        self.capture_attempts = parsed(&var, "ROLLCALL_CAPTURE_ATTEMPTS", self.capture_attempts);
    }

    pub fn cooldown(&self) -> chrono::TimeDelta {
        let secs = i64::try_from(self.cooldown_secs).unwrap_or(i64::MAX).min(i64::MAX / 1000);
        chrono::TimeDelta::seconds(secs)
    }
}

fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, current: T) -> T {
    match var(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring unparseable environment override");
                current
            }
        },
        None => current,
    }
}
