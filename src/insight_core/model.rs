//! Isolation Forest ensemble
//!
//! Scores follow the canonical convention `s = 2^(-E[h(x)] / c(ψ))`: quickly
//! isolated points score close to 1. Classification flags points scoring
//! *below* the contamination threshold, which is the established behavior of
//! this engine and is pinned by tests.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::feature::validate_features;
use super::tree::{average_path_length, IsolationTree};
use crate::config::ForestConfig;
use crate::utils::AnalysisError;

/// Binary outcome of classifying a point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Normal,
    Anomaly,
}

impl Label {
    pub fn is_anomaly(self) -> bool {
        self == Label::Anomaly
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Normal => write!(f, "Normal"),
            Label::Anomaly => write!(f, "Anomaly"),
        }
    }
}

/// A point together with its raw score and label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPoint {
    pub point: Vec<f64>,
    pub raw_score: f64,
    pub label: Label,
}

/// Quantile cut over training scores
///
/// Sorts ascending and picks index `floor((1 - contamination) * n)`, clamped
/// to the last element. An empty score set yields `0.0`.
pub fn calibrate_threshold(scores: &[f64], contamination: f64) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let idx = (((1.0 - contamination) * n as f64).floor() as usize).min(n - 1);
    sorted[idx]
}

/// Immutable fitted state: trees plus the threshold calibrated on them
#[derive(Debug, Clone)]
pub struct Ensemble {
    trees: Vec<IsolationTree>,
    threshold: f64,
    subsample_size: usize,
    n_features: usize,
}

impl Ensemble {
    /// Build a fresh ensemble and calibrate its threshold on `data`
    ///
    /// Per-tree seeds are drawn from `rng` in order before trees are built in
    /// parallel, so the result depends only on `rng`'s state.
    pub fn fit<R: Rng>(
        config: &ForestConfig,
        data: ArrayView2<'_, f64>,
        rng: &mut R,
    ) -> Result<Self, AnalysisError> {
        config.validate()?;
        validate_features(data)?;

        let n_samples = data.nrows();
        let samples_per_tree = config.subsample_size.min(n_samples);
        let max_depth = IsolationTree::max_depth_for(config.subsample_size);

        let seeds: Vec<u64> = (0..config.num_trees).map(|_| rng.gen()).collect();
        let trees: Vec<IsolationTree> = seeds
            .into_par_iter()
            .map(|seed| {
                let mut tree_rng = StdRng::seed_from_u64(seed);
                let indices = index::sample(&mut tree_rng, n_samples, samples_per_tree).into_vec();
                IsolationTree::fit(data, &indices, max_depth, &mut tree_rng)
            })
            .collect::<Result<Vec<_>, AnalysisError>>()?;

        let mut ensemble = Self {
            trees,
            threshold: 0.0,
            subsample_size: config.subsample_size,
            n_features: data.ncols(),
        };

        let scores = ensemble.score_rows(data);
        ensemble.threshold = calibrate_threshold(&scores, config.contamination);

        debug!(
            trees = ensemble.trees.len(),
            samples = n_samples,
            samples_per_tree,
            max_depth,
            threshold = ensemble.threshold,
            "isolation forest fitted"
        );

        Ok(ensemble)
    }

    /// Score separating normal from anomalous points
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn trees(&self) -> &[IsolationTree] {
        &self.trees
    }

    /// Configured subsample size, used for the `c(ψ)` normalizer
    pub fn subsample_size(&self) -> usize {
        self.subsample_size
    }

    /// Dimensionality of the training data
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Anomaly score of a single point, in (0, 1]
    pub fn score(&self, point: ArrayView1<'_, f64>) -> Result<f64, AnalysisError> {
        if point.len() != self.n_features {
            return Err(AnalysisError::ValidationError(format!(
                "point has {} attributes, model was fitted on {}",
                point.len(),
                self.n_features
            )));
        }
        if let Some(column) = point.iter().position(|v| !v.is_finite()) {
            return Err(AnalysisError::ValidationError(format!(
                "point contains NaN or Inf value at column {}",
                column
            )));
        }
        Ok(self.score_point(point))
    }

    /// Anomaly scores for every row of `data`
    pub fn score_samples(&self, data: ArrayView2<'_, f64>) -> Result<Vec<f64>, AnalysisError> {
        if data.nrows() == 0 {
            return Ok(Vec::new());
        }
        if data.ncols() != self.n_features {
            return Err(AnalysisError::ValidationError(format!(
                "data has {} attributes, model was fitted on {}",
                data.ncols(),
                self.n_features
            )));
        }
        validate_features(data)?;
        Ok(self.score_rows(data))
    }

    /// Label every row of `data`
    pub fn predict(&self, data: ArrayView2<'_, f64>) -> Result<Vec<Label>, AnalysisError> {
        Ok(self
            .score_samples(data)?
            .into_iter()
            .map(|s| self.label_for(s))
            .collect())
    }

    /// Score and label every row of `data`
    pub fn score_and_predict(
        &self,
        data: ArrayView2<'_, f64>,
    ) -> Result<Vec<ScoredPoint>, AnalysisError> {
        let scores = self.score_samples(data)?;
        Ok(data
            .rows()
            .into_iter()
            .zip(scores)
            .map(|(row, raw_score)| ScoredPoint {
                point: row.to_vec(),
                raw_score,
                label: self.label_for(raw_score),
            })
            .collect())
    }

    /// Points strictly below the threshold are anomalies
    pub fn label_for(&self, score: f64) -> Label {
        if score < self.threshold {
            Label::Anomaly
        } else {
            Label::Normal
        }
    }

    fn score_rows(&self, data: ArrayView2<'_, f64>) -> Vec<f64> {
        (0..data.nrows())
            .into_par_iter()
            .map(|i| self.score_point(data.row(i)))
            .collect()
    }

    fn score_point(&self, point: ArrayView1<'_, f64>) -> f64 {
        let c = average_path_length(self.subsample_size);
        // Subsamples of at most one point only produce depth-0 leaves
        if c == 0.0 || self.trees.is_empty() {
            return 1.0;
        }
        let total: f64 = self
            .trees
            .iter()
            .map(|tree| tree.path_length(point, 0))
            .sum();
        let avg_path_length = total / self.trees.len() as f64;
        2.0_f64.powf(-avg_path_length / c)
    }
}

/// Isolation Forest anomaly detector
///
/// Each `fit` replaces the previous ensemble and threshold as a unit; a fit
/// that fails validation leaves the previous state untouched.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    config: ForestConfig,
    ensemble: Option<Arc<Ensemble>>,
}

impl IsolationForest {
    /// Create an unfitted forest, rejecting invalid configuration
    pub fn new(config: ForestConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self {
            config,
            ensemble: None,
        })
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.ensemble.is_some()
    }

    /// Fit using the configured seed, or entropy when none is set
    pub fn fit(&mut self, data: ArrayView2<'_, f64>) -> Result<(), AnalysisError> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.fit_with_rng(data, &mut rng)
    }

    /// Fit drawing all randomness from `rng`
    pub fn fit_with_rng<R: Rng>(
        &mut self,
        data: ArrayView2<'_, f64>,
        rng: &mut R,
    ) -> Result<(), AnalysisError> {
        let ensemble = Ensemble::fit(&self.config, data, rng)?;
        self.ensemble = Some(Arc::new(ensemble));
        Ok(())
    }

    /// Shared handle to the current fitted snapshot
    pub fn snapshot(&self) -> Result<Arc<Ensemble>, AnalysisError> {
        self.ensemble.clone().ok_or(AnalysisError::NotFitted)
    }

    fn fitted(&self) -> Result<&Ensemble, AnalysisError> {
        self.ensemble.as_deref().ok_or(AnalysisError::NotFitted)
    }

    pub fn threshold(&self) -> Result<f64, AnalysisError> {
        Ok(self.fitted()?.threshold())
    }

    pub fn score(&self, point: &[f64]) -> Result<f64, AnalysisError> {
        self.fitted()?.score(ArrayView1::from(point))
    }

    pub fn score_samples(&self, data: ArrayView2<'_, f64>) -> Result<Vec<f64>, AnalysisError> {
        self.fitted()?.score_samples(data)
    }

    pub fn predict(&self, data: ArrayView2<'_, f64>) -> Result<Vec<Label>, AnalysisError> {
        self.fitted()?.predict(data)
    }

    pub fn score_and_predict(
        &self,
        data: ArrayView2<'_, f64>,
    ) -> Result<Vec<ScoredPoint>, AnalysisError> {
        self.fitted()?.score_and_predict(data)
    }
}

/// Run Isolation Forest anomaly detection on a feature matrix
///
/// # Arguments
/// * `features` - Feature matrix (rows=samples, cols=features)
/// * `config` - Forest hyperparameters
///
/// # Returns
/// * `Ok((scores, labels))` - Scores in (0, 1] and labels for the same rows
/// * `Err(AnalysisError)` - If configuration or feature validation fails
///
/// # Note
/// Fits and scores the identical matrix; there is no held-out set.
pub fn run_isolation_forest(
    features: Array2<f64>,
    config: &ForestConfig,
) -> Result<(Vec<f64>, Vec<Label>), AnalysisError> {
    let mut forest = IsolationForest::new(config.clone())?;
    forest.fit(features.view())?;
    let ensemble = forest.snapshot()?;
    let scores = ensemble.score_samples(features.view())?;
    let labels = scores.iter().map(|&s| ensemble.label_for(s)).collect();
    Ok((scores, labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn cluster_with_outlier() -> Array2<f64> {
        let mut data = Vec::new();
        for i in 0..20 {
            data.push(60.0 + (i * 2) as f64);
            data.push(90.0 + (i % 10) as f64 + i as f64 * 0.05);
        }
        data.extend_from_slice(&[1000.0, 1000.0]);
        Array2::from_shape_vec((21, 2), data).unwrap()
    }

    fn ten_points() -> Array2<f64> {
        arr2(&[
            [72.0, 98.0],
            [75.0, 97.0],
            [70.0, 99.0],
            [68.0, 96.0],
            [80.0, 95.0],
            [77.0, 98.0],
            [73.0, 97.0],
            [71.0, 99.0],
            [74.0, 96.0],
            [140.0, 80.0],
        ])
    }

    fn seeded(seed: u64) -> ForestConfig {
        ForestConfig::default().with_seed(seed)
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let err = IsolationForest::new(ForestConfig::default().with_contamination(1.2)).unwrap_err();
        assert!(matches!(err, AnalysisError::ConfigError(_)));
        assert!(IsolationForest::new(ForestConfig::default().with_num_trees(0)).is_err());
    }

    #[test]
    fn test_unfitted_forest_errors() {
        let forest = IsolationForest::new(ForestConfig::default()).unwrap();
        let data = arr2(&[[1.0, 2.0]]);

        assert!(!forest.is_fitted());
        assert_eq!(forest.threshold(), Err(AnalysisError::NotFitted));
        assert_eq!(forest.score(&[1.0, 2.0]), Err(AnalysisError::NotFitted));
        assert_eq!(forest.predict(data.view()), Err(AnalysisError::NotFitted));
        assert!(forest.snapshot().is_err());
    }

    #[test]
    fn test_empty_dataset() {
        let mut forest = IsolationForest::new(seeded(1)).unwrap();
        let empty = Array2::<f64>::zeros((0, 2));

        forest.fit(empty.view()).unwrap();
        assert_eq!(forest.predict(empty.view()).unwrap(), Vec::<Label>::new());
        assert!(forest.score_samples(empty.view()).unwrap().is_empty());
        assert_eq!(forest.threshold().unwrap(), 0.0);
    }

    #[test]
    fn test_single_point_scores_one() {
        let mut forest = IsolationForest::new(seeded(3)).unwrap();
        let data = arr2(&[[72.0, 98.0]]);
        forest.fit(data.view()).unwrap();

        assert_eq!(forest.score(&[72.0, 98.0]).unwrap(), 1.0);
        assert_eq!(forest.threshold().unwrap(), 1.0);
        assert_eq!(forest.predict(data.view()).unwrap(), vec![Label::Normal]);
    }

    #[test]
    fn test_subsample_of_one_scores_one() {
        let config = seeded(3).with_subsample_size(1);
        let mut forest = IsolationForest::new(config).unwrap();
        let data = ten_points();
        forest.fit(data.view()).unwrap();

        for score in forest.score_samples(data.view()).unwrap() {
            assert_eq!(score, 1.0);
        }
    }

    #[test]
    fn test_scores_in_unit_interval() {
        let mut forest = IsolationForest::new(seeded(11)).unwrap();
        let data = cluster_with_outlier();
        forest.fit(data.view()).unwrap();

        for score in forest.score_samples(data.view()).unwrap() {
            assert!(score > 0.0 && score <= 1.0);
        }
    }

    #[test]
    fn test_outlier_scores_highest() {
        let mut forest = IsolationForest::new(seeded(42)).unwrap();
        let data = cluster_with_outlier();
        forest.fit(data.view()).unwrap();

        let scores = forest.score_samples(data.view()).unwrap();
        let outlier = scores[20];
        assert!(scores[..20].iter().all(|&s| s < outlier));
    }

    #[test]
    fn test_below_threshold_direction_is_pinned() {
        // Quickly isolated points score high, yet only scores strictly below
        // the threshold are labeled Anomaly. The far outlier therefore stays
        // Normal. Changing this must be a deliberate decision.
        let mut forest = IsolationForest::new(seeded(42)).unwrap();
        let data = cluster_with_outlier();
        forest.fit(data.view()).unwrap();

        let threshold = forest.threshold().unwrap();
        let scored = forest.score_and_predict(data.view()).unwrap();

        assert_eq!(scored[20].label, Label::Normal);
        assert!(scored[20].raw_score >= threshold);
        for point in &scored {
            assert_eq!(point.label.is_anomaly(), point.raw_score < threshold);
        }
        let anomalies = scored.iter().filter(|p| p.label.is_anomaly()).count();
        assert!(anomalies >= 1 && anomalies <= 18);
    }

    #[test]
    fn test_same_seed_is_bit_identical() {
        let data = cluster_with_outlier();

        let mut a = IsolationForest::new(seeded(7)).unwrap();
        let mut b = IsolationForest::new(seeded(7)).unwrap();
        a.fit(data.view()).unwrap();
        b.fit(data.view()).unwrap();

        assert_eq!(
            a.threshold().unwrap().to_bits(),
            b.threshold().unwrap().to_bits()
        );
        let sa: Vec<u64> = a.score_samples(data.view()).unwrap().iter().map(|s| s.to_bits()).collect();
        let sb: Vec<u64> = b.score_samples(data.view()).unwrap().iter().map(|s| s.to_bits()).collect();
        assert_eq!(sa, sb);
    }

    #[test]
    fn test_fit_with_rng_matches_configured_seed() {
        let data = ten_points();

        let mut by_config = IsolationForest::new(seeded(99)).unwrap();
        by_config.fit(data.view()).unwrap();

        let mut by_rng = IsolationForest::new(ForestConfig::default()).unwrap();
        by_rng
            .fit_with_rng(data.view(), &mut StdRng::seed_from_u64(99))
            .unwrap();

        assert_eq!(
            by_config.score_samples(data.view()).unwrap(),
            by_rng.score_samples(data.view()).unwrap()
        );
    }

    #[test]
    fn test_refit_replaces_ensemble() {
        let mut forest = IsolationForest::new(seeded(5)).unwrap();
        forest.fit(ten_points().view()).unwrap();
        let first = forest.snapshot().unwrap();

        forest.fit(cluster_with_outlier().view()).unwrap();
        let second = forest.snapshot().unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.trees().len(), 100);
        assert_eq!(second.trees().len(), 100);
    }

    #[test]
    fn test_failed_fit_keeps_previous_ensemble() {
        let mut forest = IsolationForest::new(seeded(5)).unwrap();
        forest.fit(ten_points().view()).unwrap();
        let before = forest.threshold().unwrap();

        let bad = arr2(&[[1.0, f64::NAN]]);
        assert!(forest.fit(bad.view()).is_err());
        assert_eq!(forest.threshold().unwrap(), before);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut forest = IsolationForest::new(seeded(5)).unwrap();
        forest.fit(ten_points().view()).unwrap();

        assert!(matches!(
            forest.score(&[1.0, 2.0, 3.0]),
            Err(AnalysisError::ValidationError(_))
        ));
        let wide = arr2(&[[1.0, 2.0, 3.0]]);
        assert!(forest.predict(wide.view()).is_err());
    }

    #[test]
    fn test_ten_point_threshold_is_ninth_sorted_score() {
        let config = ForestConfig::default()
            .with_num_trees(50)
            .with_subsample_size(10)
            .with_contamination(0.1)
            .with_seed(2024);
        let data = ten_points();

        let mut forest = IsolationForest::new(config.clone()).unwrap();
        forest.fit(data.view()).unwrap();

        let scores = forest.score_samples(data.view()).unwrap();
        let mut sorted = scores.clone();
        sorted.sort_by(f64::total_cmp);
        let threshold = forest.threshold().unwrap();
        assert_eq!(threshold, sorted[9]);

        let labels = forest.predict(data.view()).unwrap();
        let anomalies: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_anomaly())
            .map(|(i, _)| i)
            .collect();
        let expected: Vec<usize> = (0..10).filter(|&i| scores[i] < threshold).collect();
        assert_eq!(anomalies, expected);
        assert!(anomalies.len() <= 9);

        let mut again = IsolationForest::new(config).unwrap();
        again.fit(data.view()).unwrap();
        assert_eq!(again.predict(data.view()).unwrap(), labels);
    }

    #[test]
    fn test_calibrate_threshold_quantile() {
        let scores = [0.5, 0.1, 0.9, 0.3, 0.7];
        // floor(0.6 * 5) = 3 -> sorted [0.1, 0.3, 0.5, 0.7, 0.9][3]
        assert_eq!(calibrate_threshold(&scores, 0.4), 0.7);
        assert_eq!(calibrate_threshold(&scores, 0.01), 0.9);
        assert_eq!(calibrate_threshold(&scores, 0.99), 0.1);
        assert_eq!(calibrate_threshold(&[], 0.1), 0.0);
    }

    #[test]
    fn test_threshold_monotone_in_contamination() {
        let mut forest = IsolationForest::new(seeded(17)).unwrap();
        let data = cluster_with_outlier();
        forest.fit(data.view()).unwrap();
        let scores = forest.score_samples(data.view()).unwrap();

        let mut prev_threshold = f64::NEG_INFINITY;
        let mut prev_normal = 0;
        for contamination in [0.9, 0.5, 0.3, 0.1, 0.05, 0.01] {
            let threshold = calibrate_threshold(&scores, contamination);
            let normal = scores.iter().filter(|&&s| s >= threshold).count();
            assert!(threshold >= prev_threshold);
            assert!(normal >= prev_normal);
            prev_threshold = threshold;
            prev_normal = normal;
        }
    }

    #[test]
    fn test_run_isolation_forest() {
        let features = cluster_with_outlier();
        let (scores, labels) = run_isolation_forest(features, &seeded(8)).unwrap();

        assert_eq!(scores.len(), 21);
        assert_eq!(labels.len(), 21);
        assert!(scores[20] > scores[0]);
    }

    #[test]
    fn test_run_isolation_forest_invalid_config() {
        let features = arr2(&[[1.0, 2.0]]);
        let config = ForestConfig::default().with_contamination(0.0);
        assert!(run_isolation_forest(features, &config).is_err());
    }

    #[test]
    fn test_label_display() {
        assert_eq!(Label::Normal.to_string(), "Normal");
        assert_eq!(Label::Anomaly.to_string(), "Anomaly");
        assert_eq!(serde_json::to_string(&Label::Anomaly).unwrap(), "\"Anomaly\"");
    }

    #[test]
    fn test_score_rejects_non_finite_point() {
        let mut forest = IsolationForest::new(seeded(3)).unwrap();
        forest.fit(ten_points().view()).unwrap();

        assert_eq!(
            forest.score(&[f64::NAN, 2.0]),
            Err(AnalysisError::ValidationError(
                "point contains NaN or Inf value at column 0".to_string()
            ))
        );
        assert!(matches!(
            forest.score(&[72.0, f64::INFINITY]),
            Err(AnalysisError::ValidationError(_))
        ));
        assert!(forest.score(&[72.0, 98.0]).is_ok());
    }

    #[test]
    fn test_fit_with_extreme_magnitudes() {
        let data = arr2(&[[-1e308, 1.0], [1e308, 2.0], [0.0, 3.0]]);
        let mut forest = IsolationForest::new(seeded(1)).unwrap();
        forest.fit(data.view()).unwrap();

        let scores = forest.score_samples(data.view()).unwrap();
        assert_eq!(scores.len(), 3);
        assert!(scores.iter().all(|&s| s > 0.0 && s <= 1.0));
    }
}
