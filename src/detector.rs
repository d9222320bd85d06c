//! Record-level anomaly detection
//!
//! Projects each record to a feature vector, fits an isolation forest on the
//! projected set and scores that same set, then re-attaches label and score
//! to the original records.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ForestConfig;
use crate::insight_core::{to_feature_matrix, IsolationForest, Label};
use crate::utils::AnalysisError;

/// Domain-supplied mapping from a record to its numeric attributes
pub trait FeatureProjection<R> {
    fn project(&self, record: &R) -> Result<Vec<f64>, AnalysisError>;
}

impl<R, F> FeatureProjection<R> for F
where
    F: Fn(&R) -> Vec<f64>,
{
    fn project(&self, record: &R) -> Result<Vec<f64>, AnalysisError> {
        Ok(self(record))
    }
}

/// A record augmented with its classification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Labeled<R> {
    #[serde(flatten)]
    pub record: R,
    pub label: Label,
    pub raw_score: f64,
}

impl<R> Labeled<R> {
    pub fn is_anomaly(&self) -> bool {
        self.label.is_anomaly()
    }
}

/// Output of one detection run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection<R> {
    pub records: Vec<Labeled<R>>,
    /// Calibrated threshold; 0.0 when no records were given
    pub threshold: f64,
}

impl<R> Detection<R> {
    fn empty() -> Self {
        Self {
            records: Vec::new(),
            threshold: 0.0,
        }
    }

    pub fn labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.records.iter().map(|r| r.label)
    }
}

/// Drives projection, fit, scoring and label merge
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    config: ForestConfig,
}

impl AnomalyDetector {
    pub fn new(config: ForestConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Detect anomalies using the configured seed, or entropy when none is set
    pub fn detect<R, P>(&self, records: Vec<R>, projection: &P) -> Result<Detection<R>, AnalysisError>
    where
        P: FeatureProjection<R> + ?Sized,
    {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.detect_with_rng(records, projection, &mut rng)
    }

    /// Detect anomalies drawing all randomness from `rng`
    pub fn detect_with_rng<R, P, G>(
        &self,
        records: Vec<R>,
        projection: &P,
        rng: &mut G,
    ) -> Result<Detection<R>, AnalysisError>
    where
        P: FeatureProjection<R> + ?Sized,
        G: Rng,
    {
        if records.is_empty() {
            warn!("no records to score");
            return Ok(Detection::empty());
        }

        let rows = records
            .iter()
            .map(|record| projection.project(record))
            .collect::<Result<Vec<_>, _>>()?;
        let features = to_feature_matrix(rows)?;

        // Tree depth and score normalizer follow the clipped subsample size
        let config = self
            .config
            .clone()
            .with_subsample_size(self.config.subsample_size.min(records.len()));

        let mut forest = IsolationForest::new(config)?;
        forest.fit_with_rng(features.view(), rng)?;
        let ensemble = forest.snapshot()?;
        let scores = ensemble.score_samples(features.view())?;

        let records: Vec<Labeled<R>> = records
            .into_iter()
            .zip(scores)
            .map(|(record, raw_score)| Labeled {
                record,
                label: ensemble.label_for(raw_score),
                raw_score,
            })
            .collect();

        let anomalies = records.iter().filter(|r| r.is_anomaly()).count();
        info!(
            records = records.len(),
            anomalies,
            threshold = ensemble.threshold(),
            "anomaly detection complete"
        );

        Ok(Detection {
            records,
            threshold: ensemble.threshold(),
        })
    }
}
