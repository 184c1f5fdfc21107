use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use reqwest::Client;
use startup_predictor::{
    config::Config,
    ml::{
        dataset::load_records, rescan_thresholds, FeatureSet, ModelPackage, ModelType,
        ThresholdAnalysis, ThresholdObjective, Trainer,
    },
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "startup-cli")]
#[command(about = "Startup Predictor CLI", long_about = None)]
struct Cli {
    /// Prediction server base URL
    #[arg(short, long, default_value = "http://localhost:5001", env = "STARTUP_PREDICTOR_ENDPOINT")]
    endpoint: String,

    /// Configuration file layered over the built-in defaults
    #[arg(short, long, env = "CONFIG_PATH", default_value = "config/default.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model package from a CSV export
    Train {
        /// Source CSV
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Where the package is written
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// gradient_boosting or stacking
        #[arg(short, long)]
        model_type: Option<ModelType>,

        /// basic or advanced
        #[arg(short, long)]
        feature_set: Option<FeatureSet>,

        /// Threshold selection rule
        #[arg(long)]
        objective: Option<ThresholdObjective>,

        #[arg(long)]
        seed: Option<u64>,

        /// Skip SMOTE + Tomek rebalancing
        #[arg(long)]
        no_resample: bool,

        /// Run the configured hyperparameter grid search
        #[arg(long)]
        grid_search: bool,
    },

    /// Re-scan decision thresholds for an existing package
    Thresholds {
        /// Package to analyze
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// CSV the package was trained on
        #[arg(short, long)]
        data: Option<PathBuf>,

        #[arg(long)]
        objective: Option<ThresholdObjective>,

        /// Recall floor for the recall_constrained objective
        #[arg(long)]
        min_recall: Option<f64>,

        /// Write the per-threshold table as CSV
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Store the newly selected threshold in the package
        #[arg(long)]
        save: bool,
    },

    /// Score records through a running server
    Predict {
        /// JSON file with one record or an array of records
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Show the model loaded by the server
    Model,

    /// Check server health
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "startup_predictor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Commands::Train {
            data,
            output,
            model_type,
            feature_set,
            objective,
            seed,
            no_resample,
            grid_search,
        } => {
            let mut training = Config::load_from(&cli.config)
                .context("Failed to load configuration")?
                .training;
            if let Some(data) = data {
                training.data_path = data;
            }
            if let Some(output) = output {
                training.output_path = output;
            }
            if let Some(model_type) = model_type {
                training.model_type = model_type;
            }
            if let Some(feature_set) = feature_set {
                training.feature_set = feature_set;
            }
            if let Some(objective) = objective {
                training.threshold.objective = objective;
            }
            if let Some(seed) = seed {
                training.seed = seed;
            }
            if no_resample {
                training.resample = false;
            }
            if grid_search {
                training.grid_search.enabled = true;
            }

            let report = tokio::task::spawn_blocking(move || Trainer::new(training).run()).await??;
            let package = &report.outcome.package;
            let metrics = &report.outcome.metrics;

            println!("✅ Trained {}", package.metadata.model_type.display_name());
            println!("   Package:   {}", report.package_path.display());
            println!("   SHA-256:   {}", report.checksum);
            println!("   Features:  {}", package.metadata.n_features);
            println!("   Threshold: {:.2}", package.threshold);
            println!("   Accuracy:  {:.4}", metrics.accuracy);
            println!("   Precision: {:.4}", metrics.precision);
            println!("   Recall:    {:.4}", metrics.recall);
            println!("   F1:        {:.4}", metrics.f1_score);
            println!("   ROC AUC:   {:.4}", metrics.roc_auc);
            if let Some(search) = &report.outcome.grid_search {
                println!(
                    "   Grid search best CV accuracy {:.4} over {} candidates",
                    search.best_score,
                    search.candidates.len()
                );
            }
        }

        Commands::Thresholds {
            model,
            data,
            objective,
            min_recall,
            report,
            save,
        } => {
            let config = Config::load_from(&cli.config).context("Failed to load configuration")?;
            let model_path = model.unwrap_or(config.model.artifact_path);
            let data_path = data.unwrap_or(config.training.data_path);
            let mut threshold_config = config.training.threshold;
            if let Some(objective) = objective {
                threshold_config.objective = objective;
            }
            if let Some(min_recall) = min_recall {
                threshold_config.min_recall = min_recall;
            }

            let (analysis, package_path) = tokio::task::spawn_blocking(move || {
                let mut package = ModelPackage::load(&model_path)?;
                let records = load_records(&data_path)?;
                let analysis = rescan_thresholds(&mut package, records, &threshold_config)?;
                if let Some(report) = &report {
                    analysis.write_csv(report)?;
                }
                if save {
                    package.save(&model_path)?;
                }
                Ok::<_, startup_predictor::AppError>((analysis, model_path))
            })
            .await??;

            print_threshold_table(&analysis);
            if save {
                println!("✅ Threshold {:.2} saved to {}", analysis.selected, package_path.display());
            }
        }

        Commands::Predict { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Cannot read {}", file.display()))?;
            let body: serde_json::Value = serde_json::from_str(&raw)?;
            let url = if body.is_array() {
                format!("{}/predict/batch", cli.endpoint)
            } else if body.is_object() {
                format!("{}/predict", cli.endpoint)
            } else {
                bail!("Expected a JSON object or array in {}", file.display());
            };

            let response = client.post(url).json(&body).send().await?;
            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::Model => {
            let response = client.get(format!("{}/model", cli.endpoint)).send().await?;
            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::Health => {
            let response = client.get(format!("{}/health", cli.endpoint)).send().await?;
            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}

fn print_threshold_table(analysis: &ThresholdAnalysis) {
    println!(
        "{:>9} {:>9} {:>9} {:>9} {:>9} {:>6} {:>6}  rating",
        "threshold", "accuracy", "precision", "recall", "f1", "fp", "fn"
    );
    for row in &analysis.rows {
        let marker = if (row.threshold - analysis.selected).abs() < 1e-9 { "*" } else { " " };
        println!(
            "{}{:>8.2} {:>9.4} {:>9.4} {:>9.4} {:>9.4} {:>6} {:>6}  {}",
            marker,
            row.threshold,
            row.accuracy,
            row.precision,
            row.recall,
            row.f1,
            row.fp,
            row.fn_,
            row.rating()
        );
    }

    println!();
    println!("Selected ({}): {:.2}", analysis.objective, analysis.selected);
    println!("Best F1: {:.2}  Best accuracy: {:.2}  Fewest errors: {:.2}", analysis.best_f1, analysis.best_accuracy, analysis.min_errors);
    match analysis.scenarios.early_stage {
        Some(t) => println!("Early-stage investor (recall >= 95%): {:.2}", t),
        None => println!("Early-stage investor (recall >= 95%): no threshold qualifies"),
    }
    println!("Balanced investor: {:.2}", analysis.scenarios.balanced);
    println!("Conservative investor: {:.2}", analysis.scenarios.conservative);
}
