//! Command-line interface
//!
//! Four subcommands: `predict` (single record), `batch-predict` (ordered
//! batch under either strategy), `train`, and `evaluate`. The serving
//! commands always leave a parseable JSON document at the output path — the
//! prediction payload on success, `{error, timestamp}` on failure — and exit
//! non-zero on any top-level failure.

use crate::batch::{BatchConfig, BatchEngine, BatchStrategy};
use crate::bundle::{ModelBundle, ModelKind};
use crate::data;
use crate::evaluation;
use crate::pipeline::ScalerType;
use crate::predict;
use crate::training::{Algorithm, TaskType, Trainer, TrainerConfig};
use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "fastbreak")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Basketball analytics ML pipeline: train, tune, evaluate, and serve predictions")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Predict a single record
    Predict {
        /// Trained model bundle (JSON blob)
        #[arg(long)]
        model_path: PathBuf,

        /// Input JSON file containing one record
        #[arg(long)]
        input_file: PathBuf,

        /// Output JSON file
        #[arg(long)]
        output_file: PathBuf,

        /// Model type tag (player_performance, injury_risk, game_outcome)
        #[arg(long)]
        model_type: String,

        /// Algorithm tag recorded in the output
        #[arg(long, default_value = "random_forest")]
        algorithm: String,
    },

    /// Predict a batch of records
    BatchPredict {
        #[arg(long)]
        model_path: PathBuf,

        /// Input JSON: {"batch_data": [...]} or a bare list of records
        #[arg(long)]
        input_file: PathBuf,

        #[arg(long)]
        output_file: PathBuf,

        #[arg(long)]
        model_type: String,

        #[arg(long, default_value = "random_forest")]
        algorithm: String,

        /// Use the vectorized strategy instead of row-parallel
        #[arg(long)]
        optimize: bool,

        /// Worker pool size override for the row-parallel strategy
        #[arg(long)]
        max_workers: Option<usize>,
    },

    /// Train a model and write a bundle
    Train {
        /// Training data (CSV or JSON)
        #[arg(long)]
        data: PathBuf,

        /// Target column name
        #[arg(long)]
        target: String,

        /// Algorithm (linear_regression, logistic_regression, random_forest, auto)
        #[arg(long, default_value = "auto")]
        algorithm: String,

        /// Task type (regression, classification)
        #[arg(long, default_value = "regression")]
        task: String,

        #[arg(long, default_value = "player_performance")]
        model_type: String,

        /// Scaler (none, standard, minmax, robust)
        #[arg(long, default_value = "standard")]
        scaler: String,

        /// Keep only the top-k statistically selected features
        #[arg(long)]
        top_features: Option<usize>,

        /// Run this many hyperparameter search trials before training
        #[arg(long)]
        tune_trials: Option<usize>,

        /// Output bundle path
        #[arg(long)]
        output: PathBuf,

        /// Optional path for the training report JSON
        #[arg(long)]
        report_file: Option<PathBuf>,
    },

    /// Evaluate a bundle against labelled data
    Evaluate {
        #[arg(long)]
        model_path: PathBuf,

        /// Labelled data (CSV or JSON)
        #[arg(long)]
        data: PathBuf,

        /// Target column name
        #[arg(long)]
        target: String,

        #[arg(long)]
        output_file: PathBuf,
    },
}

/// Load a data file by extension.
pub fn load_data(path: &Path) -> anyhow::Result<DataFrame> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    let df = match ext {
        "csv" => CsvReadOptions::default()
            .with_infer_schema_length(Some(1000))
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?,
        "json" => JsonReader::new(std::fs::File::open(path)?).finish()?,
        _ => anyhow::bail!("Unsupported file format: {}", ext),
    };

    Ok(df)
}

/// Run the parsed CLI, returning the process exit code. Serving commands
/// convert their failures into an error document at the output path before
/// returning a failure code.
pub fn run(cli: Cli) -> u8 {
    match cli.command {
        Commands::Predict {
            model_path,
            input_file,
            output_file,
            model_type,
            algorithm,
        } => run_with_error_document(&output_file.clone(), || {
            cmd_predict(&model_path, &input_file, &output_file, &model_type, &algorithm)
        }),
        Commands::BatchPredict {
            model_path,
            input_file,
            output_file,
            model_type,
            algorithm,
            optimize,
            max_workers,
        } => run_with_error_document(&output_file.clone(), || {
            cmd_batch_predict(
                &model_path,
                &input_file,
                &output_file,
                &model_type,
                &algorithm,
                optimize,
                max_workers,
            )
        }),
        Commands::Evaluate {
            model_path,
            data,
            target,
            output_file,
        } => run_with_error_document(&output_file.clone(), || {
            cmd_evaluate(&model_path, &data, &target, &output_file)
        }),
        Commands::Train {
            data,
            target,
            algorithm,
            task,
            model_type,
            scaler,
            top_features,
            tune_trials,
            output,
            report_file,
        } => match cmd_train(
            &data,
            &target,
            &algorithm,
            &task,
            &model_type,
            &scaler,
            top_features,
            tune_trials,
            &output,
            report_file.as_deref(),
        ) {
            Ok(()) => 0,
            Err(err) => {
                error!(error = %err, "training failed");
                1
            }
        },
    }
}

/// The output path always ends up holding parseable JSON: the success
/// payload, or an error document with at least `error` and `timestamp`.
fn run_with_error_document(
    output_file: &Path,
    command: impl FnOnce() -> anyhow::Result<()>,
) -> u8 {
    match command() {
        Ok(()) => 0,
        Err(err) => {
            error!(error = %err, "command failed");
            let document = serde_json::json!({
                "error": err.to_string(),
                "timestamp": Utc::now(),
            });
            if let Ok(rendered) = serde_json::to_string_pretty(&document) {
                let _ = std::fs::write(output_file, rendered);
            }
            1
        }
    }
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read input file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse JSON from {}", path.display()))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    std::fs::write(path, rendered)
        .with_context(|| format!("failed to write output file {}", path.display()))?;
    Ok(())
}

fn cmd_predict(
    model_path: &Path,
    input_file: &Path,
    output_file: &Path,
    model_type: &str,
    algorithm: &str,
) -> anyhow::Result<()> {
    let bundle = ModelBundle::load(
        model_path,
        Some(ModelKind::parse(model_type)),
        Some(algorithm),
    )?;
    info!(algorithm, model_type, "model bundle loaded");

    let record = data::parse_single_input(read_json(input_file)?)?;
    let result = predict::predict_record(&record, &bundle)?;
    write_json(output_file, &result)?;

    info!(output = %output_file.display(), "prediction completed");
    Ok(())
}

fn cmd_batch_predict(
    model_path: &Path,
    input_file: &Path,
    output_file: &Path,
    model_type: &str,
    algorithm: &str,
    optimize: bool,
    max_workers: Option<usize>,
) -> anyhow::Result<()> {
    let bundle = ModelBundle::load(
        model_path,
        Some(ModelKind::parse(model_type)),
        Some(algorithm),
    )?;

    let records = data::parse_batch_input(read_json(input_file)?)?;
    info!(total = records.len(), optimize, "starting batch prediction");

    let mut config = BatchConfig::default();
    if let Some(workers) = max_workers {
        config = config.with_max_workers(workers);
    }
    let engine = BatchEngine::with_config(Arc::new(bundle), config);

    let strategy = if optimize {
        BatchStrategy::Vectorized
    } else {
        BatchStrategy::RowParallel
    };
    let outcome = engine.run(&records, strategy);

    write_json(output_file, &outcome)?;
    info!(
        successful = outcome.analysis.successful_predictions,
        total = records.len(),
        output = %output_file.display(),
        "batch prediction completed"
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_train(
    data_path: &Path,
    target: &str,
    algorithm: &str,
    task: &str,
    model_type: &str,
    scaler: &str,
    top_features: Option<usize>,
    tune_trials: Option<usize>,
    output: &Path,
    report_file: Option<&Path>,
) -> anyhow::Result<()> {
    let df = load_data(data_path)?;
    info!(rows = df.height(), cols = df.width(), "training data loaded");

    let task = match task {
        "regression" => TaskType::Regression,
        "classification" | "binary_classification" => TaskType::BinaryClassification,
        other => anyhow::bail!("Invalid task type: {}", other),
    };

    let scaler_type = match scaler {
        "none" => ScalerType::None,
        "standard" => ScalerType::Standard,
        "minmax" => ScalerType::MinMax,
        "robust" => ScalerType::Robust,
        other => anyhow::bail!("Invalid scaler type: {}", other),
    };

    let mut config = TrainerConfig::new(task, target, ModelKind::parse(model_type))
        .with_scaler(scaler_type);

    match algorithm {
        "auto" => {}
        "linear" | "linear_regression" => {
            config = config.with_algorithm(Algorithm::LinearRegression)
        }
        "logistic" | "logistic_regression" => {
            config = config.with_algorithm(Algorithm::LogisticRegression)
        }
        "random_forest" => config = config.with_algorithm(Algorithm::RandomForest),
        other => anyhow::bail!("Invalid algorithm: {}", other),
    }

    if let Some(k) = top_features {
        config = config.with_top_features(k);
    }
    if let Some(n_trials) = tune_trials {
        config = config.with_tuning(n_trials);
    }

    let (bundle, report) = Trainer::new(config).fit(&df)?;
    bundle.save(output)?;
    info!(
        algorithm = %report.algorithm,
        bundle = %output.display(),
        "bundle written"
    );

    if let Some(report_path) = report_file {
        write_json(report_path, &report)?;
    }

    Ok(())
}

fn cmd_evaluate(
    model_path: &Path,
    data_path: &Path,
    target: &str,
    output_file: &Path,
) -> anyhow::Result<()> {
    let bundle = ModelBundle::load(model_path, None, None)?;
    let df = load_data(data_path)?;

    let report = evaluation::evaluate_bundle(&bundle, &df, target)?;
    write_json(output_file, &report)?;

    info!(
        task = %report.task,
        n_samples = report.n_samples,
        output = %output_file.display(),
        "evaluation completed"
    );
    Ok(())
}
