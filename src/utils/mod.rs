/// Utility modules for error handling and parameter validation
pub mod error;
pub mod type_convert;

// Re-export commonly used types
pub use error::AnalysisError;
pub use type_convert::{percentage, validate_contamination, validate_positive};
