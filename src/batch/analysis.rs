//! Batch-level aggregation
//!
//! Summary statistics computed over a finished batch: success rate and
//! timing in the metadata, confidence distribution and model-type-specific
//! performance stats in the analysis. Everything is guarded for the empty
//! batch — aggregation never divides by zero.

use crate::bundle::ModelKind;
use crate::predict::{PredictionResult, RecordOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Batch run metadata
#[derive(Debug, Clone, Serialize)]
pub struct BatchMetadata {
    pub total_samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_samples: Option<usize>,
    pub batch_processing_time_seconds: f64,
    pub average_time_per_sample_ms: f64,
    pub model_type: String,
    pub model_algorithm: String,
    pub optimization_used: bool,
    pub success_rate: f64,
    pub timestamp: DateTime<Utc>,
}

/// Confidence histogram over successful predictions
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfidenceDistribution {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Aggregated insight over a finished batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchAnalysis {
    pub total_predictions: usize,
    pub successful_predictions: usize,
    pub failed_predictions: usize,
    pub average_confidence: f64,
    pub confidence_distribution: ConfidenceDistribution,
    pub model_performance: Map<String, Value>,
}

/// The complete result of one batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub predictions: Vec<RecordOutcome>,
    pub batch_metadata: BatchMetadata,
    pub analysis: BatchAnalysis,
}

/// Fraction of successful outcomes; 0 for an empty batch.
pub fn success_rate(outcomes: &[RecordOutcome]) -> f64 {
    if outcomes.is_empty() {
        return 0.0;
    }
    let successes = outcomes.iter().filter(|o| o.is_success()).count();
    successes as f64 / outcomes.len() as f64
}

/// Analyze a finished batch.
pub fn analyze(outcomes: &[RecordOutcome], kind: ModelKind) -> BatchAnalysis {
    let successful: Vec<&PredictionResult> =
        outcomes.iter().filter_map(|o| o.as_prediction()).collect();

    let mut distribution = ConfidenceDistribution::default();
    for p in &successful {
        if p.confidence >= 0.8 {
            distribution.high += 1;
        } else if p.confidence >= 0.6 {
            distribution.medium += 1;
        } else {
            distribution.low += 1;
        }
    }

    let average_confidence = if successful.is_empty() {
        0.0
    } else {
        successful.iter().map(|p| p.confidence).sum::<f64>() / successful.len() as f64
    };

    BatchAnalysis {
        total_predictions: outcomes.len(),
        successful_predictions: successful.len(),
        failed_predictions: outcomes.len() - successful.len(),
        average_confidence,
        confidence_distribution: distribution,
        model_performance: model_performance(&successful, kind),
    }
}

fn model_performance(successful: &[&PredictionResult], kind: ModelKind) -> Map<String, Value> {
    let mut performance = Map::new();
    if successful.is_empty() {
        return performance;
    }

    match kind {
        ModelKind::PlayerPerformance => {
            let points: Vec<f64> = successful
                .iter()
                .map(|p| {
                    p.domain_output
                        .get("performance_metrics")
                        .and_then(|m| m.get("predicted_points"))
                        .and_then(|v| v.as_f64())
                        .unwrap_or(0.0)
                })
                .collect();

            performance.insert("avg_predicted_points".to_string(), json!(mean(&points)));
            performance.insert(
                "min_predicted_points".to_string(),
                json!(points.iter().copied().fold(f64::INFINITY, f64::min)),
            );
            performance.insert(
                "max_predicted_points".to_string(),
                json!(points.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
            );
            performance.insert("std_predicted_points".to_string(), json!(std(&points)));
        }
        ModelKind::InjuryRisk => {
            let probs: Vec<f64> = successful
                .iter()
                .map(|p| {
                    p.domain_output
                        .get("injury_probability")
                        .and_then(|v| v.as_f64())
                        .unwrap_or(0.0)
                })
                .collect();

            let high_risk = probs.iter().filter(|&&p| p >= 0.7).count();
            performance.insert("avg_injury_probability".to_string(), json!(mean(&probs)));
            performance.insert("high_risk_players".to_string(), json!(high_risk));
            performance.insert(
                "high_risk_percentage".to_string(),
                json!(high_risk as f64 / probs.len() as f64 * 100.0),
            );
        }
        ModelKind::GameOutcome => {
            let probs: Vec<f64> = successful
                .iter()
                .map(|p| {
                    p.domain_output
                        .get("win_probability")
                        .and_then(|v| v.as_f64())
                        .unwrap_or(0.5)
                })
                .collect();

            performance.insert("avg_win_probability".to_string(), json!(mean(&probs)));
            performance.insert(
                "strong_predictions".to_string(),
                json!(probs.iter().filter(|&&p| (p - 0.5).abs() > 0.3).count()),
            );
            performance.insert(
                "uncertain_predictions".to_string(),
                json!(probs.iter().filter(|&&p| (p - 0.5).abs() < 0.1).count()),
            );
        }
        ModelKind::Unknown => {}
    }

    performance
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::ErrorResult;
    use serde_json::Map as JsonMap;

    fn prediction(index: usize, confidence: f64, domain: JsonMap<String, Value>) -> RecordOutcome {
        RecordOutcome::Prediction(PredictionResult {
            prediction: 0.0,
            confidence,
            probabilities: None,
            processing_time_ms: 1.0,
            model_type: "player_performance".to_string(),
            model_algorithm: "random_forest".to_string(),
            feature_count: 3,
            batch_index: Some(index),
            timestamp: Utc::now(),
            domain_output: domain,
        })
    }

    fn error(index: usize) -> RecordOutcome {
        RecordOutcome::Error(ErrorResult {
            batch_index: index,
            error: "bad record".to_string(),
            input_data_preview: "{}".to_string(),
            timestamp: Utc::now(),
        })
    }

    fn points_domain(points: f64) -> JsonMap<String, Value> {
        let mut metrics = JsonMap::new();
        metrics.insert("predicted_points".to_string(), json!(points));
        let mut domain = JsonMap::new();
        domain.insert("performance_metrics".to_string(), Value::Object(metrics));
        domain
    }

    #[test]
    fn test_success_rate_empty_batch() {
        assert_eq!(success_rate(&[]), 0.0);
    }

    #[test]
    fn test_analysis_empty_batch() {
        let analysis = analyze(&[], ModelKind::PlayerPerformance);
        assert_eq!(analysis.total_predictions, 0);
        assert_eq!(analysis.average_confidence, 0.0);
        assert!(analysis.model_performance.is_empty());
    }

    #[test]
    fn test_confidence_distribution_buckets() {
        let outcomes = vec![
            prediction(0, 0.9, JsonMap::new()),
            prediction(1, 0.7, JsonMap::new()),
            prediction(2, 0.3, JsonMap::new()),
            error(3),
        ];
        let analysis = analyze(&outcomes, ModelKind::Unknown);
        assert_eq!(analysis.confidence_distribution.high, 1);
        assert_eq!(analysis.confidence_distribution.medium, 1);
        assert_eq!(analysis.confidence_distribution.low, 1);
        assert_eq!(analysis.failed_predictions, 1);
    }

    #[test]
    fn test_player_performance_stats() {
        let outcomes = vec![
            prediction(0, 0.8, points_domain(10.0)),
            prediction(1, 0.8, points_domain(20.0)),
            prediction(2, 0.8, points_domain(30.0)),
        ];
        let analysis = analyze(&outcomes, ModelKind::PlayerPerformance);
        let perf = &analysis.model_performance;
        assert_eq!(perf["avg_predicted_points"].as_f64().unwrap(), 20.0);
        assert_eq!(perf["min_predicted_points"].as_f64().unwrap(), 10.0);
        assert_eq!(perf["max_predicted_points"].as_f64().unwrap(), 30.0);
        assert!(perf["std_predicted_points"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn test_injury_risk_high_risk_count() {
        let domain = |p: f64| {
            let mut d = JsonMap::new();
            d.insert("injury_probability".to_string(), json!(p));
            d
        };
        let outcomes = vec![
            prediction(0, 0.8, domain(0.9)),
            prediction(1, 0.8, domain(0.2)),
        ];
        let analysis = analyze(&outcomes, ModelKind::InjuryRisk);
        let perf = &analysis.model_performance;
        assert_eq!(perf["high_risk_players"].as_u64().unwrap(), 1);
        assert_eq!(perf["high_risk_percentage"].as_f64().unwrap(), 50.0);
    }
}
