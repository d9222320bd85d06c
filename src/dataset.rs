use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context};

use crate::detector::FeatureProjection;
use crate::utils::AnalysisError;

/// A single record with named fields, e.g. one vital-sign reading
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DataPoint {
    pub fields: HashMap<String, String>,
}

impl DataPoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion
    pub fn with_field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.insert(key.into(), value.to_string());
        self
    }

    pub fn add_field(&mut self, key: String, value: String) {
        self.fields.insert(key, value);
    }

    pub fn get_field(&self, key: &str) -> Option<&String> {
        self.fields.get(key)
    }

    /// Parse a numeric field value
    pub fn get_numeric(&self, key: &str) -> Option<f64> {
        self.get_field(key)?.trim().parse().ok()
    }
}

/// Supported record file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    Csv,
    Json,
}

impl DataFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

impl FromStr for DataFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => bail!("unsupported format '{}', expected csv or json", other),
        }
    }
}

/// A named, ordered collection of records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub data: Vec<DataPoint>,
}

impl Dataset {
    pub fn new(name: String) -> Self {
        Self {
            name,
            data: Vec::new(),
        }
    }

    pub fn add_point(&mut self, point: DataPoint) {
        self.data.push(point);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Sorted union of field names across all records
    pub fn get_field_names(&self) -> Vec<String> {
        self.data
            .iter()
            .flat_map(|point| point.fields.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Load dataset from CSV with a header row
    pub fn from_csv(name: String, csv_data: &str) -> crate::Result<Self> {
        let mut dataset = Dataset::new(name);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(csv_data.as_bytes());

        let headers = reader.headers()?.clone();

        for (line, result) in reader.records().enumerate() {
            let record = result.with_context(|| format!("malformed CSV record {}", line + 1))?;
            let fields = headers
                .iter()
                .zip(record.iter())
                .map(|(header, value)| (header.to_string(), value.to_string()))
                .collect();
            dataset.add_point(DataPoint { fields });
        }

        Ok(dataset)
    }

    /// Load dataset from a JSON array of flat objects
    pub fn from_json(name: String, json_data: &str) -> crate::Result<Self> {
        let items: Vec<HashMap<String, serde_json::Value>> =
            serde_json::from_str(json_data).context("expected a JSON array of objects")?;

        let data = items
            .into_iter()
            .map(|item| {
                let fields = item
                    .into_iter()
                    .map(|(key, value)| {
                        let value = match value {
                            serde_json::Value::String(s) => s,
                            other => other.to_string(),
                        };
                        (key, value)
                    })
                    .collect();
                DataPoint { fields }
            })
            .collect();

        Ok(Dataset { name, data })
    }

    /// Load a dataset file, naming it after the file stem
    pub fn from_path(path: &Path, format: Option<DataFormat>) -> crate::Result<Self> {
        let format = match format.or_else(|| DataFormat::from_path(path)) {
            Some(format) => format,
            None => bail!(
                "cannot infer format of {}, pass --format csv|json",
                path.display()
            ),
        };
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("dataset")
            .to_string();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        match format {
            DataFormat::Csv => Self::from_csv(name, &content),
            DataFormat::Json => Self::from_json(name, &content),
        }
    }
}

/// Projects named numeric fields of a [`DataPoint`] into a feature vector
#[derive(Debug, Clone, PartialEq)]
pub struct FieldProjection {
    fields: Vec<String>,
}

impl FieldProjection {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl FeatureProjection<DataPoint> for FieldProjection {
    fn project(&self, record: &DataPoint) -> Result<Vec<f64>, AnalysisError> {
        self.fields
            .iter()
            .map(|field| match record.get_field(field) {
                None => Err(AnalysisError::ValidationError(format!(
                    "record is missing field '{}'",
                    field
                ))),
                Some(raw) => raw.trim().parse::<f64>().map_err(|_| {
                    AnalysisError::ValidationError(format!(
                        "field '{}' is not numeric: '{}'",
                        field, raw
                    ))
                }),
            })
            .collect()
    }
}
