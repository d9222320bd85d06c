use crate::config::DetectorConfig;
use crate::dataset::{DataPoint, Dataset, FieldProjection};
use crate::detector::{AnomalyDetector, Labeled};
use crate::stats::AnomalyStats;
use crate::utils::AnalysisError;
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

/// Holds named datasets and runs anomaly detection over them
#[derive(Debug)]
pub struct InsightEngine {
    config: DetectorConfig,
    datasets: HashMap<String, Dataset>,
}

impl InsightEngine {
    /// Create an engine with the default detector configuration
    pub fn new() -> Self {
        Self {
            config: DetectorConfig::default(),
            datasets: HashMap::new(),
        }
    }

    /// Create an engine with a validated configuration
    pub fn with_config(config: DetectorConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self {
            config,
            datasets: HashMap::new(),
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Add a dataset, replacing any with the same name
    pub fn add_dataset(&mut self, dataset: Dataset) {
        self.datasets.insert(dataset.name.clone(), dataset);
    }

    pub fn get_dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets.get(name)
    }

    pub fn remove_dataset(&mut self, name: &str) -> Option<Dataset> {
        self.datasets.remove(name)
    }

    /// Sorted dataset names
    pub fn list_datasets(&self) -> Vec<String> {
        let mut names: Vec<String> = self.datasets.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get a summary of all datasets
    pub fn summary(&self) -> Vec<DatasetSummary> {
        let mut summaries: Vec<DatasetSummary> = self
            .datasets
            .values()
            .map(|dataset| DatasetSummary {
                name: dataset.name.clone(),
                record_count: dataset.len(),
                fields: dataset.get_field_names(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Fit on a dataset's configured fields and label every record
    pub fn detect_anomalies(&self, dataset_name: &str) -> Result<DetectionReport, AnalysisError> {
        let dataset = self.get_dataset(dataset_name).ok_or_else(|| {
            AnalysisError::ValidationError(format!("unknown dataset '{}'", dataset_name))
        })?;

        let detector = AnomalyDetector::new(self.config.forest.clone())?;
        let projection = FieldProjection::new(self.config.fields.iter().cloned());
        let detection = detector.detect(dataset.data.clone(), &projection)?;
        let stats = AnomalyStats::summarize(&detection.records);

        info!(
            dataset = dataset_name,
            total = stats.total,
            anomalies = stats.anomalies,
            rate = stats.anomaly_rate,
            "dataset classified"
        );

        Ok(DetectionReport {
            dataset: dataset_name.to_string(),
            fields: self.config.fields.clone(),
            threshold: detection.threshold,
            stats,
            records: detection.records,
        })
    }
}

impl Default for InsightEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary information about a dataset
#[derive(Debug, Clone)]
pub struct DatasetSummary {
    pub name: String,
    pub record_count: usize,
    pub fields: Vec<String>,
}

/// Labeled records plus their aggregate counts
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub dataset: String,
    pub fields: Vec<String>,
    pub threshold: f64,
    pub stats: AnomalyStats,
    pub records: Vec<Labeled<DataPoint>>,
}

impl DetectionReport {
    pub fn anomalies(&self) -> impl Iterator<Item = &Labeled<DataPoint>> {
        self.records.iter().filter(|r| r.is_anomaly())
    }
}
