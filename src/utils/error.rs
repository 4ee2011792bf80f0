//! Error Handling Module
//!
//! Defines the error taxonomy for the experiment driver.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for training, checkpointing and sweep operations
#[derive(Error, Debug)]
pub enum ExperimentError {
    /// The dataset is missing locally and could not be fetched
    #[error("Dataset unavailable: {0}")]
    DataUnavailable(String),

    /// Feature or label dimensions disagree with each other or with the model
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// No persisted artifact resolves from the given name or handle
    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    /// A forward pass or gradient step could not be computed
    #[error("Computation failure: {0}")]
    ComputationFailure(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for ExperimentError {
    fn from(err: serde_json::Error) -> Self {
        ExperimentError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ExperimentError {
    fn from(err: toml::de::Error) -> Self {
        ExperimentError::Config(err.to_string())
    }
}

/// Convenience Result type for experiment operations
pub type Result<T> = std::result::Result<T, ExperimentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExperimentError::ArtifactNotFound("lr_sweep-run0-1".to_string());
        assert_eq!(err.to_string(), "Artifact not found: lr_sweep-run0-1");

        let err = ExperimentError::ShapeMismatch("expected 28x28x1".to_string());
        assert_eq!(err.to_string(), "Shape mismatch: expected 28x28x1");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ExperimentError = io_err.into();
        assert!(matches!(err, ExperimentError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: ExperimentError = json_err.into();
        assert!(matches!(err, ExperimentError::Serialization(_)));
    }
}
