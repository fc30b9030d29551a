use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Minimum objectness for a localized plate box.
    pub model_confidence: f32,

    /// A recognised text must score strictly above this to be accepted.
    pub ocr_confidence: f32,

    pub registry_path: PathBuf,

    /// Frames are resized to this resolution before localization.
    pub working_width: u32,
    pub working_height: u32,

    /// Target duration of one loop iteration.
    pub frame_interval_ms: u64,

    /// Capacity of the queue towards the presentation thread.
    pub display_queue: usize,

    /// Font used to draw plate labels. Without it labels are plain bars.
    pub overlay_font: Option<PathBuf>,

    /// Command used to open route URLs. Platform default when unset.
    pub route_opener: Option<String>,

    pub models: ModelPaths,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    /// YOLOv5 ONNX plate localizer.
    pub localizer: PathBuf,
    /// Tesseract data directory.
    pub tessdata: PathBuf,
    pub language: String,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            localizer: PathBuf::from("models/plate_best.onnx"),
            tessdata: PathBuf::from("models"),
            language: "licence".to_string(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            model_confidence: 0.25,
            ocr_confidence: 0.25,
            registry_path: PathBuf::from("vehicle_database.json"),
            working_width: 800,
            working_height: 600,
            frame_interval_ms: 30,
            display_queue: 8,
            overlay_font: None,
            route_opener: None,
            models: ModelPaths::default(),
        }
    }
}

impl GateConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: GateConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("model_confidence", self.model_confidence),
            ("ocr_confidence", self.ocr_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.working_width == 0 || self.working_height == 0 {
            return Err(ConfigError::Invalid(
                "working resolution must be positive".to_string(),
            ));
        }
        if self.frame_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "frame_interval_ms must be positive".to_string(),
            ));
        }
        if self.display_queue == 0 {
            return Err(ConfigError::Invalid(
                "display_queue must hold at least one event".to_string(),
            ));
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}
