use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by the recognition capabilities and the frame source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CapabilityError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Camera failure: {0}")]
    Camera(String),

    #[error("Inference failed: {0}")]
    Inference(String),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid licence plate '{0}': at least 4 alphanumeric characters are required")]
    InvalidPlate(String),

    #[error("Both origin and destination are required")]
    MissingRoute,

    #[error("Failed to persist registry to {path}: {reason}")]
    Persist { path: PathBuf, reason: String },
}

/// Fatal acquisition failures. They keep the loop in the stopped state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Cannot open camera: {0}. Please check your camera connection")]
    CameraUnavailable(String),

    #[error("Failed to load recognition models: {0}")]
    ModelLoad(String),

    #[error("Detection worker panicked")]
    WorkerPanicked,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
