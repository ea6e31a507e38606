//! Error types for the CartoonGAN trainer

use std::path::PathBuf;

use thiserror::Error;

use crate::training::LossKind;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration (paths, dimensions, hyper-parameters)
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Checkpoint or pretrained weight file could not be read or written
    #[error("Checkpoint I/O failed for {}: {source}", path.display())]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: tch::TchError,
    },

    /// Image data could not be loaded
    #[error("Failed to load image data from {}: {reason}", path.display())]
    Data { path: PathBuf, reason: String },

    /// A loss became NaN or infinite
    #[error("Non-finite {kind} loss ({value}) at epoch {epoch}")]
    NonFiniteLoss {
        kind: LossKind,
        value: f64,
        epoch: usize,
    },

    /// Torch error
    #[error(transparent)]
    Tch(#[from] tch::TchError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    pub(crate) fn data(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Data {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
