use serde::Serialize;

use crate::detector::Labeled;
use crate::insight_core::Label;
use crate::utils::percentage;

/// Label counts over a classified dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AnomalyStats {
    pub total: usize,
    pub anomalies: usize,
    pub normal: usize,
    /// Percentage of anomalies, 0 for an empty dataset
    pub anomaly_rate: f64,
}

impl AnomalyStats {
    /// Summarize a sequence of labels
    pub fn from_labels<I>(labels: I) -> Self
    where
        I: IntoIterator<Item = Label>,
    {
        let (total, anomalies) = labels
            .into_iter()
            .fold((0, 0), |(total, anomalies), label| {
                (total + 1, anomalies + usize::from(label.is_anomaly()))
            });

        AnomalyStats {
            total,
            anomalies,
            normal: total - anomalies,
            anomaly_rate: percentage(anomalies, total),
        }
    }

    /// Summarize labeled records
    pub fn summarize<R>(records: &[Labeled<R>]) -> Self {
        Self::from_labels(records.iter().map(|r| r.label))
    }
}
