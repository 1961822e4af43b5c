// THEORY:
// A single error type for the whole engine. The per-frame core (sampling,
// detection, selection, drawing) never fails: a frame that cannot be processed
// is simply skipped by the loop. Errors only come from the edges of the system:
// loading configuration, loading a label font, reading frames from disk, and
// packaging recorded output.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EffectError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Font error: {0}")]
    Font(String),

    #[error("Frame source error: {0}")]
    Source(String),

    #[error("Recorder error: {0}")]
    Recorder(String),

    #[error("No supported export encoding is available")]
    ExportUnavailable,

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for EffectError {
    fn from(err: tokio::task::JoinError) -> Self {
        EffectError::Task(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EffectError>;
