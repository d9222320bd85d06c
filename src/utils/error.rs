use thiserror::Error;

/// Custom error type for detection operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// Validation errors (e.g., NaN features, dimension mismatch, missing field)
    #[error("ValidationError: {0}")]
    ValidationError(String),
    /// Invalid forest or detector configuration
    #[error("ConfigError: {0}")]
    ConfigError(String),
    /// Scoring or prediction requested before any fit
    #[error("NotFitted: isolation forest has not been fitted")]
    NotFitted,
}
