use ndarray::{Array2, ArrayView2};

use crate::utils::AnalysisError;

/// Validate feature matrix dimensions and values
///
/// An empty (zero-row) matrix is valid: fitting and predicting on it yields
/// empty results.
///
/// # Arguments
/// * `features` - Feature matrix to validate
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(AnalysisError::ValidationError)` if invalid
pub fn validate_features(features: ArrayView2<'_, f64>) -> Result<(), AnalysisError> {
    if features.nrows() > 0 && features.ncols() == 0 {
        return Err(AnalysisError::ValidationError(
            "feature matrix must have at least one column".to_string(),
        ));
    }

    // Check for NaN or Inf values
    if let Some(((row, col), _)) = features
        .indexed_iter()
        .find(|(_, v)| v.is_nan() || v.is_infinite())
    {
        return Err(AnalysisError::ValidationError(format!(
            "feature matrix contains NaN or Inf values at row {}, column {}",
            row, col
        )));
    }

    Ok(())
}

/// Stack per-record feature vectors into a matrix (rows=samples)
///
/// Every vector must share the first vector's dimensionality.
pub fn to_feature_matrix(rows: Vec<Vec<f64>>) -> Result<Array2<f64>, AnalysisError> {
    let n_rows = rows.len();
    let n_cols = rows.first().map_or(0, Vec::len);

    let mut flat = Vec::with_capacity(n_rows * n_cols);
    for (i, row) in rows.into_iter().enumerate() {
        if row.len() != n_cols {
            return Err(AnalysisError::ValidationError(format!(
                "feature vector {} has {} attributes, expected {}",
                i,
                row.len(),
                n_cols
            )));
        }
        flat.extend(row);
    }

    Array2::from_shape_vec((n_rows, n_cols), flat)
        .map_err(|e| AnalysisError::ValidationError(format!("failed to build feature matrix: {}", e)))
}
