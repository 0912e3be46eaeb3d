//! Application configuration.

use crate::error::{DeidError, DeidResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// External transcoder locations.
    pub tools: ToolsConfig,

    /// Sensitivity model settings.
    pub model: ModelConfig,

    /// Pipeline parameters.
    pub processing: ProcessingConfig,

    /// Working and shared directories and the translation log.
    pub paths: PathsConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Paths to the ffmpeg/ffprobe binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

/// Sensitivity model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// ONNX export of the sequence classifier.
    pub weights: PathBuf,

    /// Square input edge in pixels.
    pub input_size: u32,

    /// Probability at or above which a frame is sensitive.
    pub threshold: f32,

    /// Width of the recurrent state carried between batches.
    pub state_size: usize,
}

/// Which pipeline a case runs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Classify sampled frames, then cut and merge around sensitive spans.
    #[default]
    Normal,
    /// Classify, mask and re-encode every frame in one streaming pass.
    Advanced,
}

impl ProcessingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Advanced => "advanced",
        }
    }
}

impl std::str::FromStr for ProcessingMode {
    type Err = DeidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" | "fast" => Ok(Self::Normal),
            "advanced" | "streaming" => Ok(Self::Advanced),
            other => Err(DeidError::config(format!("unknown processing mode '{other}'"))),
        }
    }
}

/// Encoder family used by the streaming transformer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodeProfile {
    /// Platform hardware encoder, bitrate-driven.
    Hardware,
    /// libx264, quality-driven.
    Software,
}

impl Default for EncodeProfile {
    fn default() -> Self {
        if cfg!(target_os = "macos") {
            Self::Hardware
        } else {
            Self::Software
        }
    }
}

/// How a sensitive frame is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskFill {
    /// All-zero pixels.
    Blackout,
    /// Every pixel set to the frame's per-channel mean.
    MeanColor,
}

/// Fill used for full buffer flushes and for the end-of-stream tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskPolicy {
    pub batch_fill: MaskFill,
    pub tail_fill: MaskFill,
}

impl Default for MaskPolicy {
    fn default() -> Self {
        Self {
            batch_fill: MaskFill::Blackout,
            tail_fill: MaskFill::MeanColor,
        }
    }
}

impl MaskPolicy {
    pub fn uniform(fill: MaskFill) -> Self {
        Self {
            batch_fill: fill,
            tail_fill: fill,
        }
    }
}

/// How anonymized output files are named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NamingScheme {
    /// Seven hex characters of a random v4 UUID.
    Uuid,
    /// `<prefix><zero-padded index>`, assigned after shuffling.
    Sequential { prefix: String },
}

impl Default for NamingScheme {
    fn default() -> Self {
        Self::Uuid
    }
}

/// Pipeline parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub mode: ProcessingMode,

    /// Output frame rate in advanced mode.
    pub target_fps: f64,

    /// Output frame height in advanced mode; 0 keeps the source size.
    /// Sources at or below this height are never upscaled.
    pub target_height: u32,

    /// Frames per classification batch.
    pub buffer_size: usize,

    /// Frame sampling rate used for segment estimation in normal mode.
    pub sample_fps: f64,

    /// Constant rate factor for the software encoder.
    pub crf: u32,

    /// Bits per pixel per frame for the hardware encoder bitrate.
    pub bits_per_pixel: f64,

    /// Track timescale applied to every cut clip.
    pub timescale: u32,

    pub encode_profile: EncodeProfile,

    pub mask_policy: MaskPolicy,

    pub naming: NamingScheme,

    /// Container extension for merged case output. Unset follows the
    /// first input video of the case.
    pub output_extension: Option<String>,

    /// Remove the per-case working directory once anonymized.
    pub purge_after: bool,
}

/// Working and shared directories and the translation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Per-case intermediate output lives under this directory.
    pub working_dir: PathBuf,

    /// Anonymized output destination.
    pub shared_dir: PathBuf,

    /// CSV mapping original to anonymized names. Defaults to
    /// `<working_dir>/translation_log.csv` when unset. Must not lie inside
    /// `shared_dir`.
    pub translation_log: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "deid=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path (appended).
    pub file: Option<PathBuf>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            weights: data_dir().join("models").join("sensitivity.onnx"),
            input_size: 64,
            threshold: 0.5,
            state_size: 640,
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            mode: ProcessingMode::default(),
            target_fps: 25.0,
            target_height: 720,
            buffer_size: 64,
            sample_fps: 1.0,
            crf: 20,
            bits_per_pixel: 0.10,
            timescale: 10_000,
            encode_profile: EncodeProfile::default(),
            mask_policy: MaskPolicy::default(),
            naming: NamingScheme::default(),
            output_extension: None,
            purge_after: false,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let base = data_dir();
        Self {
            working_dir: base.join("working"),
            shared_dir: base.join("shared"),
            translation_log: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl PathsConfig {
    pub fn translation_log_path(&self) -> PathBuf {
        self.translation_log
            .clone()
            .unwrap_or_else(|| self.working_dir.join("translation_log.csv"))
    }

    /// Reject a translation log that would be published with the
    /// anonymized output.
    pub fn validate(&self) -> DeidResult<()> {
        let log = self.translation_log_path();
        if path_within(&log, &self.shared_dir) {
            return Err(DeidError::config(format!(
                "translation log {} must not be inside the shared directory {}",
                log.display(),
                self.shared_dir.display()
            )));
        }
        Ok(())
    }
}

/// Whether `path` is `dir` or lies below it. Existing prefixes are
/// canonicalized so symlinks and `..` do not hide containment.
pub fn path_within(path: &Path, dir: &Path) -> bool {
    normalize(path).starts_with(normalize(dir))
}

fn normalize(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut rest = Vec::new();
    loop {
        if existing.as_os_str().is_empty() {
            existing = Path::new(".");
        }
        if let Ok(canonical) = existing.canonicalize() {
            return rest.iter().rev().fold(canonical, |acc, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}

impl ProcessingConfig {
    /// Reject parameter combinations the pipelines cannot run with.
    pub fn validate(&self) -> DeidResult<()> {
        if self.buffer_size == 0 {
            return Err(DeidError::config("buffer_size must be at least 1"));
        }
        if !(self.target_fps > 0.0) {
            return Err(DeidError::config("target_fps must be positive"));
        }
        if !(self.sample_fps > 0.0) {
            return Err(DeidError::config("sample_fps must be positive"));
        }
        if self.timescale == 0 {
            return Err(DeidError::config("timescale must be positive"));
        }
        if self.target_height % 2 == 1 {
            return Err(DeidError::config(format!(
                "target_height must be even, got {}",
                self.target_height
            )));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %config_path.display(), error = %e, "Failed to load config");
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit path.
    pub fn load_from(path: &Path) -> DeidResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section that has constraints.
    pub fn validate(&self) -> DeidResult<()> {
        self.processing.validate()?;
        self.paths.validate()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> DeidResult<()> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> DeidResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"));
    base.join("deid").join("config.json")
}

fn data_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local").join("share"));
    base.join("deid")
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_product_behavior() {
        let config = AppConfig::default();
        assert_eq!(config.processing.target_fps, 25.0);
        assert_eq!(config.processing.target_height, 720);
        assert_eq!(config.processing.buffer_size, 64);
        assert_eq!(config.processing.crf, 20);
        assert_eq!(config.processing.timescale, 10_000);
        assert_eq!(config.processing.mask_policy.batch_fill, MaskFill::Blackout);
        assert_eq!(config.processing.mask_policy.tail_fill, MaskFill::MeanColor);
        assert_eq!(config.processing.naming, NamingScheme::Uuid);
        assert_eq!(config.model.input_size, 64);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.processing.mode = ProcessingMode::Advanced;
        config.processing.naming = NamingScheme::Sequential {
            prefix: "video".to_string(),
        };
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.processing.mode, ProcessingMode::Advanced);
        assert_eq!(loaded.processing.naming, config.processing.naming);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"processing": {"buffer_size": 16}}"#).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.processing.buffer_size, 16);
        assert_eq!(loaded.processing.target_fps, 25.0);
        assert_eq!(loaded.tools.ffmpeg, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn test_validate_rejects_zero_buffer() {
        let mut processing = ProcessingConfig::default();
        processing.buffer_size = 0;
        assert!(matches!(processing.validate(), Err(DeidError::Config { .. })));
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("fast".parse::<ProcessingMode>().unwrap(), ProcessingMode::Normal);
        assert_eq!(
            "Advanced".parse::<ProcessingMode>().unwrap(),
            ProcessingMode::Advanced
        );
        assert!("slow".parse::<ProcessingMode>().is_err());
    }

    #[test]
    fn test_translation_log_defaults_into_working_dir() {
        let paths = PathsConfig {
            working_dir: PathBuf::from("/w"),
            shared_dir: PathBuf::from("/s"),
            translation_log: None,
        };
        assert_eq!(
            paths.translation_log_path(),
            PathBuf::from("/w/translation_log.csv")
        );
        assert!(paths.validate().is_ok());

        let defaults = AppConfig::default();
        assert!(!path_within(
            &defaults.paths.translation_log_path(),
            &defaults.paths.shared_dir
        ));
        assert!(defaults.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_log_inside_shared_dir() {
        let dir = tempfile::tempdir().unwrap();
        let shared = dir.path().join("shared");
        std::fs::create_dir_all(&shared).unwrap();

        let mut config = AppConfig::default();
        config.paths.shared_dir = shared.clone();
        config.paths.translation_log = Some(shared.join("logs").join("map.csv"));
        assert!(matches!(config.validate(), Err(DeidError::Config { .. })));

        // A `..` detour still resolves into the shared directory.
        std::fs::create_dir_all(dir.path().join("other")).unwrap();
        config.paths.translation_log = Some(dir.path().join("other/../shared/map.csv"));
        assert!(config.validate().is_err());

        config.paths.translation_log = Some(dir.path().join("map.csv"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_rejects_published_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"paths": {"shared_dir": "/srv/shared", "translation_log": "/srv/shared/log.csv"}}"#,
        )
        .unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }
}
