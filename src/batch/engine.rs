//! Batch prediction engine
//!
//! Orchestrates the feature pipeline, predictor, and enricher over an
//! ordered list of records under one of two strategies:
//!
//! - **Row-parallel**: one prediction per record. Chunks at or below the
//!   sequential threshold run in order on the calling thread; larger chunks
//!   fan out over a bounded worker pool, and completions are re-sorted by
//!   original index before they are appended.
//! - **Vectorized**: the whole batch is tabulated once, the pipeline runs on
//!   the full table (enabling batch-wide median imputation), and the model
//!   is invoked once over all valid rows. Any failure on this path abandons
//!   the vectorized attempt and re-runs the complete batch row-parallel —
//!   a logged degradation, never a partial one.
//!
//! Invariants: output order mirrors input order (`predictions[i].batch_index
//! == i`), and a per-record failure never aborts the batch.

use crate::bundle::{ModelBundle, PredictorCapability};
use crate::data::{self, Record};
use crate::error::{FastbreakError, Result};
use crate::pipeline;
use crate::predict::{self, class_label, ErrorResult, PredictionResult, RecordOutcome};
use super::analysis::{self, BatchMetadata, BatchOutcome};
use chrono::Utc;
use ndarray::Array2;
use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Fixed chunk size bounding peak memory in the row-parallel strategy
const CHUNK_SIZE: usize = 100;

/// Chunks at or below this size are processed without the worker pool
const SEQUENTIAL_THRESHOLD: usize = 10;

/// Which execution strategy to use for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStrategy {
    /// One prediction per record, worker-pool-parallelized for large chunks
    RowParallel,
    /// Single bulk prediction over all valid records
    Vectorized,
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub chunk_size: usize,
    pub sequential_threshold: usize,
    /// Worker pool size for the row-parallel strategy
    pub max_workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            chunk_size: CHUNK_SIZE,
            sequential_threshold: SEQUENTIAL_THRESHOLD,
            max_workers: parallelism.min(4),
        }
    }
}

impl BatchConfig {
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self
    }
}

/// Batch prediction engine over a shared read-only bundle
pub struct BatchEngine {
    bundle: Arc<ModelBundle>,
    config: BatchConfig,
}

impl BatchEngine {
    pub fn new(bundle: Arc<ModelBundle>) -> Self {
        Self {
            bundle,
            config: BatchConfig::default(),
        }
    }

    pub fn with_config(bundle: Arc<ModelBundle>, config: BatchConfig) -> Self {
        Self { bundle, config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run the batch under the requested strategy and aggregate the results.
    /// Per-record failures surface as [`ErrorResult`] entries; this call
    /// itself only reflects the batch shape, never a record's failure.
    pub fn run(&self, records: &[Record], strategy: BatchStrategy) -> BatchOutcome {
        let start = Instant::now();

        let (outcomes, optimization_used, valid_samples) = if records.is_empty() {
            (Vec::new(), false, None)
        } else {
            match strategy {
                BatchStrategy::Vectorized => match self.run_vectorized(records) {
                    Ok((outcomes, valid)) => (outcomes, true, Some(valid)),
                    Err(err) => {
                        warn!(
                            error = %err,
                            "vectorized path failed, falling back to row-parallel strategy"
                        );
                        (self.run_row_parallel(records), false, None)
                    }
                },
                BatchStrategy::RowParallel => (self.run_row_parallel(records), false, None),
            }
        };

        let elapsed = start.elapsed().as_secs_f64();
        let total = records.len();
        let metadata = BatchMetadata {
            total_samples: total,
            valid_samples,
            batch_processing_time_seconds: elapsed,
            average_time_per_sample_ms: if total > 0 {
                elapsed * 1000.0 / total as f64
            } else {
                0.0
            },
            model_type: self.bundle.model_type.as_str().to_string(),
            model_algorithm: self.bundle.algorithm_name.clone(),
            optimization_used,
            success_rate: analysis::success_rate(&outcomes),
            timestamp: Utc::now(),
        };

        let analysis = analysis::analyze(&outcomes, self.bundle.model_type);
        info!(
            total,
            successful = analysis.successful_predictions,
            optimization_used,
            elapsed_secs = elapsed,
            "batch prediction finished"
        );

        BatchOutcome {
            predictions: outcomes,
            batch_metadata: metadata,
            analysis,
        }
    }

    // ------------------------------------------------------------------
    // Row-parallel strategy
    // ------------------------------------------------------------------

    fn run_row_parallel(&self, records: &[Record]) -> Vec<RecordOutcome> {
        let mut outcomes = Vec::with_capacity(records.len());

        for (chunk_idx, chunk) in records.chunks(self.config.chunk_size).enumerate() {
            let base = chunk_idx * self.config.chunk_size;

            if chunk.len() <= self.config.sequential_threshold {
                for (i, record) in chunk.iter().enumerate() {
                    outcomes.push(self.predict_indexed(record, base + i));
                }
            } else {
                outcomes.extend(self.run_chunk_pooled(chunk, base));
            }

            debug!(processed = outcomes.len(), total = records.len(), "chunk complete");
        }

        outcomes
    }

    /// Fan a chunk out over the bounded worker pool. Completions arrive in
    /// arbitrary order; sorting by original index restores deterministic
    /// positional output regardless of scheduling.
    fn run_chunk_pooled(&self, chunk: &[Record], base: usize) -> Vec<RecordOutcome> {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_workers)
            .build()
        {
            Ok(pool) => pool,
            Err(err) => {
                warn!(error = %err, "worker pool unavailable, processing chunk sequentially");
                return chunk
                    .iter()
                    .enumerate()
                    .map(|(i, record)| self.predict_indexed(record, base + i))
                    .collect();
            }
        };

        let (tx, rx) = mpsc::channel();
        pool.scope(|scope| {
            for (i, record) in chunk.iter().enumerate() {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    // Every error is converted inside the task: tasks never fail.
                    let outcome = self.predict_indexed(record, base + i);
                    let _ = tx.send(outcome);
                });
            }
        });
        drop(tx);

        let mut collected: Vec<RecordOutcome> = rx.into_iter().collect();
        collected.sort_by_key(|o| o.batch_index());
        collected
    }

    fn predict_indexed(&self, record: &Record, index: usize) -> RecordOutcome {
        match predict::predict_record(record, &self.bundle) {
            Ok(mut result) => {
                result.batch_index = Some(index);
                RecordOutcome::Prediction(result)
            }
            Err(err) => {
                debug!(index, error = %err, "record failed");
                RecordOutcome::Error(ErrorResult::new(index, &err, record))
            }
        }
    }

    // ------------------------------------------------------------------
    // Vectorized strategy
    // ------------------------------------------------------------------

    fn run_vectorized(&self, records: &[Record]) -> Result<(Vec<RecordOutcome>, usize)> {
        let start = Instant::now();

        let tab = data::tabulate(records).map_err(bulk_err)?;
        if tab.valid_indices.is_empty() {
            return Err(FastbreakError::BulkPath(
                "no valid input data to process".to_string(),
            ));
        }

        let matrix = pipeline::transform_frame(&tab.frame, &self.bundle).map_err(bulk_err)?;
        let bulk = self.bulk_model_outputs(&matrix)?;

        let valid_count = tab.valid_indices.len();
        let per_sample_ms = start.elapsed().as_secs_f64() * 1000.0 / valid_count as f64;

        // Re-attach enrichment row-wise: its thresholds read raw record fields.
        let mut valid_results = Vec::with_capacity(valid_count);
        for (row, &original_idx) in tab.valid_indices.iter().enumerate() {
            let record = &records[original_idx];
            let probabilities = bulk.probabilities.as_ref().map(|all| all[row].clone());
            let domain_output = predict::enrich::enrich(
                bulk.predictions[row],
                probabilities.as_ref(),
                record,
                self.bundle.model_type,
            );

            valid_results.push(PredictionResult {
                prediction: bulk.predictions[row],
                confidence: bulk.confidences[row],
                probabilities,
                processing_time_ms: per_sample_ms,
                model_type: self.bundle.model_type.as_str().to_string(),
                model_algorithm: self.bundle.algorithm_name.clone(),
                feature_count: matrix.ncols(),
                batch_index: Some(original_idx),
                timestamp: Utc::now(),
                domain_output,
            });
        }

        // Reassemble the full-length list: valid rows at their original
        // indices, fixed error entries everywhere else.
        let mut results = Vec::with_capacity(records.len());
        let mut next_valid = valid_results.into_iter();
        for (i, record) in records.iter().enumerate() {
            if tab.invalid_indices.contains(&i) {
                results.push(RecordOutcome::Error(ErrorResult {
                    batch_index: i,
                    error: "Invalid input data".to_string(),
                    input_data_preview: data::input_preview(record),
                    timestamp: Utc::now(),
                }));
            } else {
                let result = next_valid.next().ok_or_else(|| {
                    FastbreakError::BulkPath("row count drifted during reassembly".to_string())
                })?;
                results.push(RecordOutcome::Prediction(result));
            }
        }

        Ok((results, valid_count))
    }

    fn bulk_model_outputs(&self, matrix: &Array2<f64>) -> Result<BulkOutputs> {
        let n_rows = matrix.nrows();

        match self.bundle.capability() {
            PredictorCapability::Classifier => {
                let proba = self.bundle.model.predict_proba(matrix).map_err(bulk_err)?;
                let classes = self
                    .bundle
                    .model
                    .classes()
                    .unwrap_or_else(|| (0..proba.ncols()).map(|i| i as f64).collect());

                let mut predictions = Vec::with_capacity(n_rows);
                let mut confidences = Vec::with_capacity(n_rows);
                let mut probabilities = Vec::with_capacity(n_rows);

                for i in 0..n_rows {
                    let mut best_idx = 0;
                    let mut best_prob = f64::NEG_INFINITY;
                    let mut prob_map = BTreeMap::new();
                    for (j, &class) in classes.iter().enumerate() {
                        let p = proba[[i, j]];
                        prob_map.insert(class_label(class), p);
                        if p > best_prob {
                            best_prob = p;
                            best_idx = j;
                        }
                    }
                    predictions.push(classes[best_idx]);
                    confidences.push(best_prob);
                    probabilities.push(prob_map);
                }

                Ok(BulkOutputs {
                    predictions,
                    confidences,
                    probabilities: Some(probabilities),
                })
            }
            PredictorCapability::Regressor { has_ensemble } => {
                let predictions = self.bundle.model.predict(matrix).map_err(bulk_err)?;
                let predictions: Vec<f64> = predictions.to_vec();

                let confidences = if has_ensemble {
                    self.bulk_ensemble_confidences(matrix, &predictions)
                } else {
                    vec![0.8; n_rows]
                };

                Ok(BulkOutputs {
                    predictions,
                    confidences,
                    probabilities: None,
                })
            }
        }
    }

    /// Same disagreement formula as the single path, computed over one bulk
    /// member-prediction pass.
    fn bulk_ensemble_confidences(&self, matrix: &Array2<f64>, predictions: &[f64]) -> Vec<f64> {
        let members = match self.bundle.model.member_predictions(matrix) {
            Some(Ok(members)) if !members.is_empty() => members,
            _ => return vec![0.8; predictions.len()],
        };

        predictions
            .iter()
            .enumerate()
            .map(|(i, &prediction)| {
                if prediction == 0.0 {
                    return 0.8;
                }
                let values: Vec<f64> = members.iter().map(|m| m[i]).collect();
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
                (1.0 - (std / prediction.abs()).min(1.0)).max(0.1)
            })
            .collect()
    }
}

struct BulkOutputs {
    predictions: Vec<f64>,
    confidences: Vec<f64>,
    probabilities: Option<Vec<BTreeMap<String, f64>>>,
}

fn bulk_err(err: FastbreakError) -> FastbreakError {
    match err {
        FastbreakError::BulkPath(_) => err,
        other => FastbreakError::BulkPath(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::ModelKind;
    use crate::model::{LinearRegression, TrainedModel};
    use ndarray::array;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn points_bundle() -> Arc<ModelBundle> {
        // predicted points = 0.5 * minutes
        let mut model = LinearRegression::new();
        model
            .fit(
                &array![[10.0], [20.0], [30.0], [40.0]],
                &array![5.0, 10.0, 15.0, 20.0],
            )
            .unwrap();
        Arc::new(ModelBundle::new(
            TrainedModel::LinearRegression(model),
            None,
            vec!["minutes".to_string()],
            ModelKind::PlayerPerformance,
            "linear_regression",
        ))
    }

    #[test]
    fn test_empty_batch() {
        let engine = BatchEngine::new(points_bundle());
        let outcome = engine.run(&[], BatchStrategy::Vectorized);
        assert!(outcome.predictions.is_empty());
        assert_eq!(outcome.batch_metadata.total_samples, 0);
        assert_eq!(outcome.batch_metadata.success_rate, 0.0);
    }

    #[test]
    fn test_row_parallel_order_and_values() {
        let records: Vec<Record> = (0..15)
            .map(|i| record(json!({"minutes": (i * 2) as f64})))
            .collect();

        let engine = BatchEngine::new(points_bundle());
        let outcome = engine.run(&records, BatchStrategy::RowParallel);

        assert_eq!(outcome.predictions.len(), 15);
        for (i, p) in outcome.predictions.iter().enumerate() {
            assert_eq!(p.batch_index(), i);
            let result = p.as_prediction().unwrap();
            assert!((result.prediction - (i as f64)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_default_config_worker_bound() {
        let config = BatchConfig::default();
        assert!(config.max_workers >= 1 && config.max_workers <= 4);
        assert_eq!(config.chunk_size, 100);
        assert_eq!(config.sequential_threshold, 10);
    }

    #[test]
    fn test_vectorized_invalid_record_backfill() {
        let records = vec![
            record(json!({"minutes": 10.0})),
            record(json!({"minutes": 20.0, "lineup": {"a": 1}})),
            record(json!({"minutes": 30.0})),
        ];

        let engine = BatchEngine::new(points_bundle());
        let outcome = engine.run(&records, BatchStrategy::Vectorized);

        assert_eq!(outcome.predictions.len(), 3);
        assert!(outcome.predictions[0].is_success());
        assert!(!outcome.predictions[1].is_success());
        assert!(outcome.predictions[2].is_success());
        assert_eq!(outcome.predictions[1].batch_index(), 1);
        assert!(outcome.batch_metadata.optimization_used);
        assert_eq!(outcome.batch_metadata.valid_samples, Some(2));
    }
}
