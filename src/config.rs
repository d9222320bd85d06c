//! Forest and detector configuration

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::utils::{validate_contamination, validate_positive, AnalysisError};

/// Default number of trees in the ensemble
pub const DEFAULT_NUM_TREES: usize = 100;
/// Default per-tree subsample size
pub const DEFAULT_SUBSAMPLE_SIZE: usize = 256;
/// Default expected anomaly fraction
pub const DEFAULT_CONTAMINATION: f64 = 0.1;

/// Isolation forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Number of isolation trees
    pub num_trees: usize,
    /// Points drawn (without replacement) per tree, clipped to the dataset size
    pub subsample_size: usize,
    /// Expected fraction of anomalies, in (0, 1)
    pub contamination: f64,
    /// Seed for reproducible fits; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            num_trees: DEFAULT_NUM_TREES,
            subsample_size: DEFAULT_SUBSAMPLE_SIZE,
            contamination: DEFAULT_CONTAMINATION,
            seed: None,
        }
    }
}

impl ForestConfig {
    /// Set number of trees
    pub fn with_num_trees(mut self, n: usize) -> Self {
        self.num_trees = n;
        self
    }

    /// Set subsample size
    pub fn with_subsample_size(mut self, n: usize) -> Self {
        self.subsample_size = n;
        self
    }

    /// Set contamination rate
    pub fn with_contamination(mut self, c: f64) -> Self {
        self.contamination = c;
        self
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Fail fast on values the algorithm would silently mis-handle
    pub fn validate(&self) -> Result<(), AnalysisError> {
        validate_positive("num_trees", self.num_trees)?;
        validate_positive("subsample_size", self.subsample_size)?;
        validate_contamination(self.contamination)
    }
}

/// Configuration for the record-level detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    #[serde(flatten)]
    pub forest: ForestConfig,
    /// Numeric record fields projected into each feature vector, in order
    pub fields: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            forest: ForestConfig::default(),
            fields: vec!["heart_rate".to_string(), "blood_oxygen".to_string()],
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        self.forest.validate()?;
        if self.fields.is_empty() {
            return Err(AnalysisError::ConfigError(
                "at least one feature field is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let config: Self = toml::from_str(content).context("invalid detector config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&content)
    }
}
