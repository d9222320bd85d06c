//! Snapshot-and-swap wrapper for concurrent scoring during refits

use std::sync::Arc;

use ndarray::ArrayView2;
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::model::{Ensemble, Label};
use crate::config::ForestConfig;
use crate::utils::AnalysisError;

/// Isolation forest that can be refitted while other threads score
///
/// A refit builds a complete [`Ensemble`] without holding the lock and then
/// publishes it with a single pointer swap. Readers work on the snapshot that
/// was current when they called [`SharedForest::snapshot`].
#[derive(Debug)]
pub struct SharedForest {
    config: ForestConfig,
    current: RwLock<Option<Arc<Ensemble>>>,
}

impl SharedForest {
    pub fn new(config: ForestConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self {
            config,
            current: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Refit using the configured seed, or entropy when none is set
    pub fn refit(&self, data: ArrayView2<'_, f64>) -> Result<Arc<Ensemble>, AnalysisError> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.refit_with_rng(data, &mut rng)
    }

    /// Build a new ensemble from `rng` and publish it
    pub fn refit_with_rng<R: Rng>(
        &self,
        data: ArrayView2<'_, f64>,
        rng: &mut R,
    ) -> Result<Arc<Ensemble>, AnalysisError> {
        let ensemble = Arc::new(Ensemble::fit(&self.config, data, rng)?);
        let previous = self.current.write().replace(Arc::clone(&ensemble));
        debug!(replaced = previous.is_some(), "published ensemble snapshot");
        Ok(ensemble)
    }

    /// Current fitted snapshot
    pub fn snapshot(&self) -> Result<Arc<Ensemble>, AnalysisError> {
        self.current.read().clone().ok_or(AnalysisError::NotFitted)
    }

    pub fn predict(&self, data: ArrayView2<'_, f64>) -> Result<Vec<Label>, AnalysisError> {
        self.snapshot()?.predict(data)
    }

    pub fn score_samples(&self, data: ArrayView2<'_, f64>) -> Result<Vec<f64>, AnalysisError> {
        self.snapshot()?.score_samples(data)
    }
}
