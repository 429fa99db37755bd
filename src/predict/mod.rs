//! Single-record prediction
//!
//! Wraps a loaded bundle: feature pipeline → model call → domain enrichment,
//! producing one [`PredictionResult`]. The batch engine reuses this for its
//! row-parallel strategy; the CLI uses it directly for single predictions.

pub mod enrich;

use crate::bundle::{ModelBundle, PredictorCapability};
use crate::data::{input_preview, Record};
use crate::error::{FastbreakError, Result};
use crate::pipeline;
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

/// Default confidence for point predictions without an ensemble signal
const DEFAULT_CONFIDENCE: f64 = 0.8;

/// One successful prediction
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    pub prediction: f64,
    pub confidence: f64,
    pub probabilities: Option<BTreeMap<String, f64>>,
    pub processing_time_ms: f64,
    pub model_type: String,
    pub model_algorithm: String,
    pub feature_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_index: Option<usize>,
    pub timestamp: DateTime<Utc>,
    /// Model-type-specific fields, flattened into the result document
    #[serde(flatten)]
    pub domain_output: serde_json::Map<String, serde_json::Value>,
}

/// One failed record in a batch
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResult {
    pub batch_index: usize,
    pub error: String,
    pub input_data_preview: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResult {
    pub fn new(batch_index: usize, error: &FastbreakError, record: &Record) -> Self {
        Self {
            batch_index,
            error: error.to_string(),
            input_data_preview: input_preview(record),
            timestamp: Utc::now(),
        }
    }
}

/// Exactly one of these per input record, at the record's positional index
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RecordOutcome {
    Prediction(PredictionResult),
    Error(ErrorResult),
}

impl RecordOutcome {
    pub fn batch_index(&self) -> usize {
        match self {
            RecordOutcome::Prediction(p) => p.batch_index.unwrap_or(0),
            RecordOutcome::Error(e) => e.batch_index,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RecordOutcome::Prediction(_))
    }

    pub fn as_prediction(&self) -> Option<&PredictionResult> {
        match self {
            RecordOutcome::Prediction(p) => Some(p),
            RecordOutcome::Error(_) => None,
        }
    }
}

/// Raw model output for one feature vector
#[derive(Debug, Clone)]
pub struct ModelOutput {
    pub prediction: f64,
    pub confidence: f64,
    pub probabilities: Option<BTreeMap<String, f64>>,
}

/// Render a class label the way result documents expect ("0", "1", ...).
pub fn class_label(class: f64) -> String {
    if class.fract() == 0.0 {
        format!("{}", class as i64)
    } else {
        format!("{}", class)
    }
}

/// Run the bundle's model on one feature vector.
///
/// Classifiers take the argmax-probability class with the max probability as
/// confidence. Ensemble regressors derive confidence from member
/// disagreement: `max(0.1, 1 − min(1, std/|prediction|))`, falling back to
/// 0.8 for a zero prediction or when members are unavailable. The formula is
/// a compatibility heuristic, not a calibrated uncertainty.
pub fn predict_vector(vector: &[f64], bundle: &ModelBundle) -> Result<ModelOutput> {
    let row = Array2::from_shape_vec((1, vector.len()), vector.to_vec())
        .map_err(|e| FastbreakError::Prediction(e.to_string()))?;

    match bundle.capability() {
        PredictorCapability::Classifier => {
            let proba = bundle
                .model
                .predict_proba(&row)
                .map_err(|e| FastbreakError::Prediction(e.to_string()))?;
            let classes = bundle
                .model
                .classes()
                .unwrap_or_else(|| (0..proba.ncols()).map(|i| i as f64).collect());

            let mut best_idx = 0;
            let mut best_prob = f64::NEG_INFINITY;
            let mut prob_map = BTreeMap::new();
            for (j, &class) in classes.iter().enumerate() {
                let p = proba[[0, j]];
                prob_map.insert(class_label(class), p);
                if p > best_prob {
                    best_prob = p;
                    best_idx = j;
                }
            }

            Ok(ModelOutput {
                prediction: classes[best_idx],
                confidence: best_prob,
                probabilities: Some(prob_map),
            })
        }
        PredictorCapability::Regressor { has_ensemble } => {
            let predictions = bundle
                .model
                .predict(&row)
                .map_err(|e| FastbreakError::Prediction(e.to_string()))?;
            let prediction = predictions[0];

            let confidence = if has_ensemble {
                ensemble_confidence(&row, prediction, bundle)
            } else {
                DEFAULT_CONFIDENCE
            };

            Ok(ModelOutput {
                prediction,
                confidence,
                probabilities: None,
            })
        }
    }
}

fn ensemble_confidence(row: &Array2<f64>, prediction: f64, bundle: &ModelBundle) -> f64 {
    if prediction == 0.0 {
        return DEFAULT_CONFIDENCE;
    }

    match bundle.model.member_predictions(row) {
        Some(Ok(members)) if !members.is_empty() => {
            let values: Vec<f64> = members.iter().map(|m| m[0]).collect();
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
            (1.0 - (std / prediction.abs()).min(1.0)).max(0.1)
        }
        _ => DEFAULT_CONFIDENCE,
    }
}

/// Full single-record prediction: pipeline, model call, enrichment, timing.
pub fn predict_record(record: &Record, bundle: &ModelBundle) -> Result<PredictionResult> {
    let start = Instant::now();

    let vector = pipeline::build_vector(record, bundle)?;
    let output = predict_vector(&vector, bundle)?;
    let domain_output = enrich::enrich(
        output.prediction,
        output.probabilities.as_ref(),
        record,
        bundle.model_type,
    );

    Ok(PredictionResult {
        prediction: output.prediction,
        confidence: output.confidence,
        probabilities: output.probabilities,
        processing_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        model_type: bundle.model_type.as_str().to_string(),
        model_algorithm: bundle.algorithm_name.clone(),
        feature_count: vector.len(),
        batch_index: None,
        timestamp: Utc::now(),
        domain_output,
    })
}
