use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vital_insight_engine::{DataFormat, Dataset, DetectionReport, DetectorConfig, InsightEngine};

#[derive(Parser)]
#[command(name = "vital-insight-engine")]
#[command(author = "Hummer Team")]
#[command(version = "0.1.0")]
#[command(about = "Isolation-forest anomaly detection for vital-sign records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit an isolation forest on a file and label every record
    Detect {
        /// Path to a CSV or JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Input format (inferred from the extension when omitted)
        #[arg(long)]
        format: Option<DataFormat>,

        /// TOML file with forest settings and feature fields
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Comma-separated numeric fields forming each feature vector
        #[arg(long, value_delimiter = ',')]
        fields: Option<Vec<String>>,

        /// Number of trees
        #[arg(short = 't', long)]
        trees: Option<usize>,

        /// Per-tree subsample size
        #[arg(short = 's', long)]
        subsample: Option<usize>,

        /// Expected anomaly fraction in (0, 1)
        #[arg(long)]
        contamination: Option<f64>,

        /// Seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show record count and fields of a file
    Inspect {
        /// Path to a CSV or JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Input format (inferred from the extension when omitted)
        #[arg(long)]
        format: Option<DataFormat>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vital_insight_engine=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Detect {
            file,
            format,
            config,
            fields,
            trees,
            subsample,
            contamination,
            seed,
            json,
        } => {
            let mut detector_config = match config {
                Some(path) => DetectorConfig::from_file(path)?,
                None => DetectorConfig::default(),
            };
            if let Some(fields) = fields {
                detector_config.fields = fields;
            }
            if let Some(trees) = trees {
                detector_config.forest.num_trees = trees;
            }
            if let Some(subsample) = subsample {
                detector_config.forest.subsample_size = subsample;
            }
            if let Some(contamination) = contamination {
                detector_config.forest.contamination = contamination;
            }
            if seed.is_some() {
                detector_config.forest.seed = seed;
            }

            let dataset = Dataset::from_path(&file, format)?;
            let name = dataset.name.clone();

            let mut engine = InsightEngine::with_config(detector_config)?;
            engine.add_dataset(dataset);
            let report = engine.detect_anomalies(&name)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }

        Commands::Inspect { file, format } => {
            let dataset = Dataset::from_path(&file, format)?;
            println!("Loaded dataset '{}' with {} records", dataset.name, dataset.len());
            println!("Fields: {:?}", dataset.get_field_names());
        }
    }

    Ok(())
}

fn print_report(report: &DetectionReport) {
    println!("\n=== Anomaly summary for '{}' ===", report.dataset);
    println!("Features:  {}", report.fields.join(", "));
    println!("Total:     {}", report.stats.total);
    println!("Anomalies: {}", report.stats.anomalies);
    println!("Normal:    {}", report.stats.normal);
    println!("Rate:      {:.1}%", report.stats.anomaly_rate);
    println!("Threshold: {:.6}", report.threshold);

    if report.stats.anomalies > 0 {
        println!("\n--- Anomalous records ---");
        for (index, labeled) in report.records.iter().enumerate().filter(|(_, r)| r.is_anomaly()) {
            let values: Vec<String> = report
                .fields
                .iter()
                .map(|field| {
                    let value = labeled.record.get_field(field).map_or("?", String::as_str);
                    format!("{}={}", field, value)
                })
                .collect();
            println!(
                "#{:<5} score={:.4}  {}",
                index,
                labeled.raw_score,
                values.join("  ")
            );
        }
    }
}
