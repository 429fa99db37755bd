//! Model evaluation
//!
//! Standard regression and classification metrics plus basketball-specific
//! analyses: how often a points prediction lands within game-relevant
//! margins, win-prediction accuracy, and probability calibration.

use crate::bundle::{ModelBundle, PredictorCapability};
use crate::error::{FastbreakError, Result};
use crate::pipeline;
use ndarray::Array1;
use polars::prelude::*;
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Regression metrics
#[derive(Debug, Clone, Serialize)]
pub struct RegressionMetrics {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
    /// Mean absolute percentage error, with near-zero targets floored
    pub mape: f64,
}

/// Classification metrics at the 0.5 decision threshold
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

/// Full evaluation document written by the CLI
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub task: String,
    pub n_samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regression: Option<RegressionMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<ClassificationMetrics>,
    pub basketball_metrics: Map<String, Value>,
}

fn check_lengths(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(FastbreakError::ShapeError {
            expected: format!("{} predictions", y_true.len()),
            actual: format!("{} predictions", y_pred.len()),
        });
    }
    if y_true.is_empty() {
        return Err(FastbreakError::ValidationError(
            "cannot evaluate on zero samples".to_string(),
        ));
    }
    Ok(())
}

/// Compute regression metrics.
pub fn regression_metrics(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<RegressionMetrics> {
    check_lengths(y_true, y_pred)?;
    let n = y_true.len() as f64;

    let errors: Vec<f64> = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| t - p)
        .collect();

    let mse = errors.iter().map(|e| e * e).sum::<f64>() / n;
    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;

    let y_mean = y_true.sum() / n;
    let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();
    let ss_res: f64 = errors.iter().map(|e| e * e).sum();
    let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

    let mape = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| ((t - p) / t.abs().max(1e-8)).abs())
        .sum::<f64>()
        / n
        * 100.0;

    Ok(RegressionMetrics {
        mse,
        rmse: mse.sqrt(),
        mae,
        r2,
        mape,
    })
}

/// Compute classification metrics for 0/1 labels.
pub fn classification_metrics(
    y_true: &Array1<f64>,
    y_pred: &Array1<f64>,
) -> Result<ClassificationMetrics> {
    check_lengths(y_true, y_pred)?;

    let (mut tp, mut fp, mut tn, mut fn_) = (0usize, 0usize, 0usize, 0usize);
    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        match (*t > 0.5, *p > 0.5) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (false, false) => tn += 1,
            (true, false) => fn_ += 1,
        }
    }

    let accuracy = (tp + tn) as f64 / y_true.len() as f64;
    let precision = if tp + fp > 0 {
        tp as f64 / (tp + fp) as f64
    } else {
        0.0
    };
    let recall = if tp + fn_ > 0 {
        tp as f64 / (tp + fn_) as f64
    } else {
        0.0
    };
    let f1_score = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    Ok(ClassificationMetrics {
        accuracy,
        precision,
        recall,
        f1_score,
    })
}

/// Points-prediction analysis: margins that matter for box-score forecasts.
pub fn points_analysis(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Map<String, Value> {
    let n = y_true.len() as f64;
    let mut out = Map::new();
    if y_true.is_empty() || y_true.len() != y_pred.len() {
        return out;
    }

    let within = |margin: f64| {
        y_true
            .iter()
            .zip(y_pred.iter())
            .filter(|(t, p)| (*t - *p).abs() <= margin)
            .count() as f64
            / n
    };

    let mean_error = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| p - t)
        .sum::<f64>()
        / n;

    out.insert("within_5_points_pct".to_string(), json!(within(5.0) * 100.0));
    out.insert(
        "within_10_points_pct".to_string(),
        json!(within(10.0) * 100.0),
    );
    out.insert("mean_error".to_string(), json!(mean_error));
    out
}

/// Accuracy of 0/1 win predictions.
pub fn win_prediction_accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() || y_true.len() != y_pred.len() {
        return 0.0;
    }
    y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| (**t > 0.5) == (**p > 0.5))
        .count() as f64
        / y_true.len() as f64
}

/// Expected calibration error over equal-width probability bins.
pub fn calibration_error(y_true: &Array1<f64>, proba_pos: &Array1<f64>, n_bins: usize) -> f64 {
    if y_true.is_empty() || y_true.len() != proba_pos.len() || n_bins == 0 {
        return 0.0;
    }

    let n = y_true.len() as f64;
    let mut error = 0.0;
    for bin in 0..n_bins {
        let lo = bin as f64 / n_bins as f64;
        let hi = (bin + 1) as f64 / n_bins as f64;

        let members: Vec<usize> = proba_pos
            .iter()
            .enumerate()
            .filter(|(_, &p)| p >= lo && (p < hi || (bin == n_bins - 1 && p <= hi)))
            .map(|(i, _)| i)
            .collect();
        if members.is_empty() {
            continue;
        }

        let avg_pred: f64 =
            members.iter().map(|&i| proba_pos[i]).sum::<f64>() / members.len() as f64;
        let observed: f64 = members
            .iter()
            .filter(|&&i| y_true[i] > 0.5)
            .count() as f64
            / members.len() as f64;
        error += members.len() as f64 / n * (avg_pred - observed).abs();
    }
    error
}

/// Evaluate a loaded bundle against a labelled frame. Features run through
/// the same pipeline the batch engine uses; predictions come from one bulk
/// model call.
pub fn evaluate_bundle(
    bundle: &ModelBundle,
    df: &DataFrame,
    target: &str,
) -> Result<EvaluationReport> {
    let target_column = df
        .column(target)
        .map_err(|_| FastbreakError::FeatureNotFound(target.to_string()))?;
    let y_true: Array1<f64> = target_column
        .cast(&DataType::Float64)
        .map_err(|e| FastbreakError::DataError(e.to_string()))?
        .f64()
        .map_err(|e| FastbreakError::DataError(e.to_string()))?
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .collect();

    let features = df
        .drop(target)
        .map_err(|e| FastbreakError::DataError(e.to_string()))?;
    let matrix = pipeline::transform_frame(&features, bundle)?;

    match bundle.capability() {
        PredictorCapability::Classifier => {
            let proba = bundle.model.predict_proba(&matrix)?;
            let pos_col = proba.ncols().saturating_sub(1);
            let proba_pos: Array1<f64> = proba.column(pos_col).to_owned();
            let y_pred: Array1<f64> = proba_pos.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 });

            let mut basketball = Map::new();
            basketball.insert(
                "win_prediction_accuracy".to_string(),
                json!(win_prediction_accuracy(&y_true, &y_pred)),
            );
            basketball.insert(
                "calibration_error".to_string(),
                json!(calibration_error(&y_true, &proba_pos, 10)),
            );

            Ok(EvaluationReport {
                task: "binary_classification".to_string(),
                n_samples: y_true.len(),
                regression: None,
                classification: Some(classification_metrics(&y_true, &y_pred)?),
                basketball_metrics: basketball,
            })
        }
        PredictorCapability::Regressor { .. } => {
            let y_pred = bundle.model.predict(&matrix)?;

            let mut basketball = Map::new();
            if target.to_lowercase().contains("points") {
                basketball.insert(
                    "points_analysis".to_string(),
                    Value::Object(points_analysis(&y_true, &y_pred)),
                );
            }

            Ok(EvaluationReport {
                task: "regression".to_string(),
                n_samples: y_true.len(),
                regression: Some(regression_metrics(&y_true, &y_pred)?),
                classification: None,
                basketball_metrics: basketball,
            })
        }
    }
}
