//! Vital Insight Engine - isolation-forest anomaly detection
//!
//! This library scores fixed-dimension numeric records (heart rate and blood
//! oxygen in the reference domain) with an ensemble of randomized isolation
//! trees and labels them normal or anomalous with a contamination-calibrated
//! threshold.

pub mod config;
pub mod dataset;
pub mod detector;
pub mod engine;
pub mod insight_core;
pub mod stats;
pub mod utils;

pub use config::{DetectorConfig, ForestConfig};
pub use dataset::{DataFormat, DataPoint, Dataset, FieldProjection};
pub use detector::{AnomalyDetector, Detection, FeatureProjection, Labeled};
pub use engine::{DetectionReport, InsightEngine};
pub use insight_core::{IsolationForest, Label, ScoredPoint, SharedForest};
pub use stats::AnomalyStats;
pub use utils::AnalysisError;

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;
