use super::error::AnalysisError;

/// Validate contamination lies strictly inside (0, 1)
///
/// # Arguments
/// * `contamination` - Expected fraction of anomalous points
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(AnalysisError::ConfigError)` if out of range or not finite
pub fn validate_contamination(contamination: f64) -> Result<(), AnalysisError> {
    if !(contamination > 0.0 && contamination < 1.0) {
        return Err(AnalysisError::ConfigError(format!(
            "contamination must be in (0, 1), got {}",
            contamination
        )));
    }
    Ok(())
}

/// Validate a count parameter is strictly positive
pub fn validate_positive(name: &str, value: usize) -> Result<(), AnalysisError> {
    if value == 0 {
        return Err(AnalysisError::ConfigError(format!(
            "{} must be > 0",
            name
        )));
    }
    Ok(())
}

/// Percentage of `part` in `total`, 0 when `total` is 0
pub fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}
