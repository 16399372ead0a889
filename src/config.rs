use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classify::{InputScale, DEFAULT_INPUT_SIZE};
use crate::motion::{DetectorSettings, Roi};

const DEFAULT_PROCESS_WIDTH: u32 = 320;
const DEFAULT_PROCESS_HEIGHT: u32 = 240;
const DEFAULT_ROI_SIZE: u32 = 120;
const DEFAULT_PIXEL_THRESHOLD: u32 = 800;
const DEFAULT_DIFF_THRESHOLD: u8 = 25;
const DEFAULT_COOLDOWN_SECS: f64 = 2.0;
const DEFAULT_SETTLE_DELAY_SECS: f64 = 0.5;
const DEFAULT_POLL_INTERVAL_SECS: f64 = 0.01;
const DEFAULT_SOURCE_URL: &str = "stub://bin_camera";
const DEFAULT_SOURCE_FPS: u32 = 15;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_SNAPSHOT_DIR: &str = ".";

#[derive(Debug, Deserialize, Default)]
struct SorterConfigFile {
    motion: Option<MotionConfigFile>,
    classifier: Option<ClassifierConfigFile>,
    source: Option<SourceConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct MotionConfigFile {
    process_width: Option<u32>,
    process_height: Option<u32>,
    roi_size: Option<u32>,
    pixel_threshold: Option<u32>,
    diff_threshold: Option<u8>,
    cooldown_secs: Option<f64>,
    settle_delay_secs: Option<f64>,
    poll_interval_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifierConfigFile {
    backend: Option<ModelBackendKind>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    input_scale: Option<InputScale>,
    layout: Option<TensorLayout>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    snapshot_dir: Option<PathBuf>,
    events_db: Option<String>,
}

/// Which classifier implementation to load at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackendKind {
    /// ONNX model via tract (feature `backend-tract`).
    #[default]
    Tract,
    /// Colour-statistics fallback; needs no model file.
    Heuristic,
}

impl std::str::FromStr for ModelBackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "tract" | "onnx" => Ok(ModelBackendKind::Tract),
            "heuristic" => Ok(ModelBackendKind::Heuristic),
            other => Err(anyhow!(
                "unknown classifier backend '{}'; expected tract or heuristic",
                other
            )),
        }
    }
}

/// Memory order of the model's input tensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    #[default]
    Nhwc,
    Nchw,
}

#[derive(Debug, Clone)]
pub struct SorterConfig {
    pub motion: MotionSettings,
    pub classifier: ClassifierSettings,
    pub source: SourceSettings,
    pub output: OutputSettings,
}

#[derive(Debug, Clone)]
pub struct MotionSettings {
    pub process_width: u32,
    pub process_height: u32,
    pub roi_size: u32,
    pub pixel_threshold: u32,
    pub diff_threshold: u8,
    pub cooldown: Duration,
    pub settle_delay: Duration,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub backend: ModelBackendKind,
    pub model_path: Option<PathBuf>,
    pub input_size: u32,
    pub input_scale: InputScale,
    pub layout: TensorLayout,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub snapshot_dir: PathBuf,
    pub events_db: Option<String>,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            process_width: DEFAULT_PROCESS_WIDTH,
            process_height: DEFAULT_PROCESS_HEIGHT,
            roi_size: DEFAULT_ROI_SIZE,
            pixel_threshold: DEFAULT_PIXEL_THRESHOLD,
            diff_threshold: DEFAULT_DIFF_THRESHOLD,
            cooldown: Duration::from_secs_f64(DEFAULT_COOLDOWN_SECS),
            settle_delay: Duration::from_secs_f64(DEFAULT_SETTLE_DELAY_SECS),
            poll_interval: Duration::from_secs_f64(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

impl MotionSettings {
    /// Resolve the ROI. This is the startup geometry check.
    pub fn roi(&self) -> Result<Roi> {
        Roi::centered(self.process_width, self.process_height, self.roi_size)
    }

    pub fn detector_settings(&self) -> Result<DetectorSettings> {
        Ok(DetectorSettings {
            process_width: self.process_width,
            process_height: self.process_height,
            roi: self.roi()?,
            diff_threshold: self.diff_threshold,
        })
    }

    pub fn validate(&self) -> Result<()> {
        let roi = self.roi()?;
        if self.pixel_threshold as usize >= roi.area() {
            log::warn!(
                "pixel_threshold {} is not below the ROI area {}; motion can never trigger",
                self.pixel_threshold,
                roi.area()
            );
        }
        if self.poll_interval.is_zero() {
            return Err(anyhow!("poll_interval must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            backend: ModelBackendKind::default(),
            model_path: None,
            input_size: DEFAULT_INPUT_SIZE,
            input_scale: InputScale::default(),
            layout: TensorLayout::default(),
        }
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOURCE_URL.to_string(),
            target_fps: DEFAULT_SOURCE_FPS,
            width: DEFAULT_SOURCE_WIDTH,
            height: DEFAULT_SOURCE_HEIGHT,
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            snapshot_dir: PathBuf::from(DEFAULT_SNAPSHOT_DIR),
            events_db: None,
        }
    }
}

impl SorterConfig {
    /// Load from `SORTER_CONFIG` (TOML or JSON), apply env overrides, validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SORTER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a specific file without consulting the environment.
    pub fn from_path(path: &Path) -> Result<Self> {
        let cfg = Self::from_file(read_config_file(path)?)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SorterConfigFile) -> Result<Self> {
        let motion_defaults = MotionSettings::default();
        let motion_file = file.motion.unwrap_or_default();
        let motion = MotionSettings {
            process_width: motion_file
                .process_width
                .unwrap_or(motion_defaults.process_width),
            process_height: motion_file
                .process_height
                .unwrap_or(motion_defaults.process_height),
            roi_size: motion_file.roi_size.unwrap_or(motion_defaults.roi_size),
            pixel_threshold: motion_file
                .pixel_threshold
                .unwrap_or(motion_defaults.pixel_threshold),
            diff_threshold: motion_file
                .diff_threshold
                .unwrap_or(motion_defaults.diff_threshold),
            cooldown: seconds_or(
                "cooldown_secs",
                motion_file.cooldown_secs,
                motion_defaults.cooldown,
            )?,
            settle_delay: seconds_or(
                "settle_delay_secs",
                motion_file.settle_delay_secs,
                motion_defaults.settle_delay,
            )?,
            poll_interval: seconds_or(
                "poll_interval_secs",
                motion_file.poll_interval_secs,
                motion_defaults.poll_interval,
            )?,
        };

        let classifier_defaults = ClassifierSettings::default();
        let classifier_file = file.classifier.unwrap_or_default();
        let classifier = ClassifierSettings {
            backend: classifier_file
                .backend
                .unwrap_or(classifier_defaults.backend),
            model_path: classifier_file.model_path,
            input_size: classifier_file
                .input_size
                .unwrap_or(classifier_defaults.input_size),
            input_scale: classifier_file
                .input_scale
                .unwrap_or(classifier_defaults.input_scale),
            layout: classifier_file.layout.unwrap_or(classifier_defaults.layout),
        };

        let source_defaults = SourceSettings::default();
        let source_file = file.source.unwrap_or_default();
        let source = SourceSettings {
            url: source_file.url.unwrap_or(source_defaults.url),
            target_fps: source_file.target_fps.unwrap_or(source_defaults.target_fps),
            width: source_file.width.unwrap_or(source_defaults.width),
            height: source_file.height.unwrap_or(source_defaults.height),
        };

        let output_defaults = OutputSettings::default();
        let output_file = file.output.unwrap_or_default();
        let output = OutputSettings {
            snapshot_dir: output_file
                .snapshot_dir
                .unwrap_or(output_defaults.snapshot_dir),
            events_db: output_file.events_db,
        };

        Ok(Self {
            motion,
            classifier,
            source,
            output,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SORTER_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(path) = std::env::var("SORTER_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.classifier.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(backend) = std::env::var("SORTER_MODEL_BACKEND") {
            if !backend.trim().is_empty() {
                self.classifier.backend = backend.parse()?;
            }
        }
        if let Ok(dir) = std::env::var("SORTER_SNAPSHOT_DIR") {
            if !dir.trim().is_empty() {
                self.output.snapshot_dir = PathBuf::from(dir);
            }
        }
        if let Ok(db) = std::env::var("SORTER_EVENTS_DB") {
            if !db.trim().is_empty() {
                self.output.events_db = Some(db);
            }
        }
        if let Ok(threshold) = std::env::var("SORTER_PIXEL_THRESHOLD") {
            if !threshold.trim().is_empty() {
                self.motion.pixel_threshold = threshold.trim().parse().map_err(|_| {
                    anyhow!("SORTER_PIXEL_THRESHOLD must be a non-negative integer pixel count")
                })?;
            }
        }
        if let Ok(cooldown) = std::env::var("SORTER_COOLDOWN_SECS") {
            if !cooldown.trim().is_empty() {
                let seconds: f64 = cooldown
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("SORTER_COOLDOWN_SECS must be a number of seconds"))?;
                self.motion.cooldown =
                    seconds_or("SORTER_COOLDOWN_SECS", Some(seconds), Duration::ZERO)?;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.motion.validate()?;
        if self.classifier.input_size == 0 {
            return Err(anyhow!("classifier input_size must be greater than zero"));
        }
        if self.classifier.backend == ModelBackendKind::Tract && self.classifier.model_path.is_none()
        {
            return Err(anyhow!(
                "classifier backend 'tract' requires model_path (or SORTER_MODEL_PATH)"
            ));
        }
        if self.source.url.trim().is_empty() {
            return Err(anyhow!("source url must not be empty"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source width and height must be greater than zero"));
        }
        Ok(())
    }
}

fn seconds_or(name: &str, value: Option<f64>, default: Duration) -> Result<Duration> {
    match value {
        None => Ok(default),
        Some(secs) => Duration::try_from_secs_f64(secs).map_err(|_| {
            anyhow!(
                "{} must be a finite, non-negative number of seconds (got {})",
                name,
                secs
            )
        }),
    }
}

fn read_config_file(path: &Path) -> Result<SorterConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_for_heuristic_backend() -> Result<()> {
        let mut cfg = SorterConfig::from_file(SorterConfigFile::default())?;
        cfg.classifier.backend = ModelBackendKind::Heuristic;
        cfg.validate()?;
        assert_eq!(cfg.motion.roi()?.area(), 120 * 120);
        assert_eq!(cfg.motion.settle_delay, Duration::from_millis(500));
        assert_eq!(cfg.motion.poll_interval, Duration::from_millis(10));
        Ok(())
    }

    #[test]
    fn tract_backend_without_model_is_rejected() -> Result<()> {
        let cfg = SorterConfig::from_file(SorterConfigFile::default())?;
        assert!(cfg.validate().is_err());
        Ok(())
    }

    #[test]
    fn oversized_roi_fails_validation() -> Result<()> {
        let mut cfg = SorterConfig::from_file(SorterConfigFile::default())?;
        cfg.classifier.backend = ModelBackendKind::Heuristic;
        cfg.motion.roi_size = 300;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("roi_size"));
        Ok(())
    }

    #[test]
    fn negative_durations_are_rejected() {
        assert!(seconds_or("cooldown_secs", Some(-1.0), Duration::ZERO).is_err());
        assert!(seconds_or("cooldown_secs", Some(f64::NAN), Duration::ZERO).is_err());
        assert!(seconds_or("cooldown_secs", Some(f64::INFINITY), Duration::ZERO).is_err());
        assert!(seconds_or("cooldown_secs", Some(1e30), Duration::ZERO).is_err());
        assert_eq!(
            seconds_or("cooldown_secs", Some(1.5), Duration::ZERO).unwrap(),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn backend_kind_parses() {
        assert_eq!("ONNX".parse::<ModelBackendKind>().unwrap(), ModelBackendKind::Tract);
        assert_eq!(
            "heuristic".parse::<ModelBackendKind>().unwrap(),
            ModelBackendKind::Heuristic
        );
        assert!("keras".parse::<ModelBackendKind>().is_err());
    }
}
