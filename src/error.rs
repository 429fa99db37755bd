//! Error types for the fastbreak pipeline

use thiserror::Error;

/// Result type alias for fastbreak operations
pub type Result<T> = std::result::Result<T, FastbreakError>;

/// Main error type for the fastbreak pipeline
#[derive(Error, Debug)]
pub enum FastbreakError {
    /// Feature engineering, imputation, alignment, or scaling could not
    /// produce a finite numeric vector for a record.
    #[error("Feature preprocessing failed: {0}")]
    Preprocessing(String),

    /// The underlying model call failed.
    #[error("Prediction failed: {0}")]
    Prediction(String),

    /// A record could not be tabulated (non-scalar value, malformed input).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The persisted bundle could not be loaded. Fatal for the whole run.
    #[error("Failed to load model bundle: {0}")]
    BundleLoad(String),

    /// The vectorized bulk path failed; the engine falls back to the
    /// row-parallel strategy for the complete batch.
    #[error("Bulk prediction path failed: {0}")]
    BulkPath(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<polars::error::PolarsError> for FastbreakError {
    fn from(err: polars::error::PolarsError) -> Self {
        FastbreakError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for FastbreakError {
    fn from(err: serde_json::Error) -> Self {
        FastbreakError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for FastbreakError {
    fn from(err: ndarray::ShapeError) -> Self {
        FastbreakError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FastbreakError::Preprocessing("bad value".to_string());
        assert_eq!(err.to_string(), "Feature preprocessing failed: bad value");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FastbreakError = io_err.into();
        assert!(matches!(err, FastbreakError::IoError(_)));
    }

    #[test]
    fn test_bulk_path_error_display() {
        let err = FastbreakError::BulkPath("shape mismatch".to_string());
        assert!(err.to_string().contains("Bulk prediction path"));
    }
}
