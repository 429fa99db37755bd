//! Model training
//!
//! Fits the closed model set on labelled data: preprocessing with the same
//! engineering and imputation the serving pipeline uses, optional
//! statistical feature selection, CV-scored automatic algorithm selection,
//! and bundle assembly. Per-run results (model comparison, validation
//! metrics) live in an explicit [`TrainingReport`] value — the trainer holds
//! no mutable history.

pub mod cross_validation;
pub mod selection;
pub mod tuning;

pub use cross_validation::{CrossValidator, CvSplit, CvStrategy};
pub use selection::{FeatureScore, SelectionConfig, SelectionResult};
pub use tuning::{Trial, TuningConfig, TuningResult};

use crate::bundle::{ModelBundle, ModelKind};
use crate::error::{FastbreakError, Result};
use crate::evaluation::{self, ClassificationMetrics, RegressionMetrics};
use crate::model::{LinearRegression, LogisticRegression, RandomForest, TrainedModel};
use crate::pipeline::{self, Scaler, ScalerType};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::time::Instant;
use tracing::info;

/// Prediction task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Regression,
    BinaryClassification,
}

/// Trainable algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    LinearRegression,
    LogisticRegression,
    RandomForest,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::LinearRegression => "linear_regression",
            Algorithm::LogisticRegression => "logistic_regression",
            Algorithm::RandomForest => "random_forest",
        }
    }

    /// Candidates tried by automatic selection, per task
    fn candidates(task: TaskType) -> &'static [Algorithm] {
        match task {
            TaskType::Regression => &[Algorithm::LinearRegression, Algorithm::RandomForest],
            TaskType::BinaryClassification => {
                &[Algorithm::LogisticRegression, Algorithm::RandomForest]
            }
        }
    }
}

/// Numeric hyperparameters shared across the model set
#[derive(Debug, Clone, Serialize)]
pub struct ModelParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    /// Regularization strength for the linear models
    pub alpha: f64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            alpha: 0.0,
        }
    }
}

/// Trainer configuration
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub task: TaskType,
    /// None runs CV-scored automatic selection over the task's candidates
    pub algorithm: Option<Algorithm>,
    pub target_column: String,
    pub model_type: ModelKind,
    pub scaler_type: ScalerType,
    pub params: ModelParams,
    pub cv_folds: usize,
    pub validation_split: f64,
    pub random_state: u64,
    /// Keep only the top-k statistically selected features
    pub top_features: Option<usize>,
    /// Run this many random-search trials and train with the best params
    pub tune_trials: Option<usize>,
}

impl TrainerConfig {
    pub fn new(task: TaskType, target_column: impl Into<String>, model_type: ModelKind) -> Self {
        Self {
            task,
            algorithm: None,
            target_column: target_column.into(),
            model_type,
            scaler_type: ScalerType::Standard,
            params: ModelParams::default(),
            cv_folds: 5,
            validation_split: 0.2,
            random_state: 42,
            top_features: None,
            tune_trials: None,
        }
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    pub fn with_scaler(mut self, scaler_type: ScalerType) -> Self {
        self.scaler_type = scaler_type;
        self
    }

    pub fn with_top_features(mut self, k: usize) -> Self {
        self.top_features = Some(k);
        self
    }

    pub fn with_tuning(mut self, n_trials: usize) -> Self {
        self.tune_trials = Some(n_trials);
        self
    }
}

/// One candidate's CV score in the comparison report
#[derive(Debug, Clone, Serialize)]
pub struct ModelScore {
    pub algorithm: String,
    pub cv_score: f64,
}

/// Explicit per-run training result
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub algorithm: String,
    pub task: TaskType,
    pub n_samples: usize,
    pub n_features: usize,
    pub feature_names: Vec<String>,
    pub model_comparison: Vec<ModelScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regression_metrics: Option<RegressionMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification_metrics: Option<ClassificationMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_selection: Option<SelectionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tuning: Option<TuningResult>,
    pub training_time_secs: f64,
}

/// Model trainer
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// Fit on a labelled frame, returning the deployable bundle and the
    /// run's report.
    pub fn fit(&self, df: &DataFrame) -> Result<(ModelBundle, TrainingReport)> {
        let start = Instant::now();
        let cfg = &self.config;

        // Same engineering and imputation the serving pipeline applies
        let engineered = pipeline::engineering::engineer_frame(df, cfg.model_type)?;
        let prepared = pipeline::imputation::impute_frame(&engineered, &[])?;

        let y = self.extract_target(&prepared)?;

        // Derived features that read the target would leak it into the
        // feature set; at serving time the target is absent anyway.
        let leaky = pipeline::engineering::derived_consuming(&cfg.target_column, cfg.model_type);
        let mut feature_names: Vec<String> = prepared
            .get_columns()
            .iter()
            .filter(|c| c.dtype() != &DataType::String)
            .map(|c| c.name().to_string())
            .filter(|name| name != &cfg.target_column)
            .filter(|name| !leaky.contains(&name.as_str()))
            .collect();

        if feature_names.is_empty() {
            return Err(FastbreakError::TrainingError(
                "no numeric feature columns found".to_string(),
            ));
        }

        let mut x = pipeline::columns_to_array2(&prepared, &feature_names)?;

        // Optional statistical selection before scaling
        let feature_selection = match cfg.top_features {
            Some(top_k) => {
                let result = selection::select_features(
                    &x,
                    &y,
                    &feature_names,
                    &SelectionConfig {
                        top_k,
                        ..Default::default()
                    },
                )?;
                let kept: Vec<usize> = feature_names
                    .iter()
                    .enumerate()
                    .filter(|(_, name)| result.selected.contains(name))
                    .map(|(j, _)| j)
                    .collect();
                x = x.select(Axis(1), &kept);
                feature_names = kept.iter().map(|&j| feature_names[j].clone()).collect();
                Some(result)
            }
            None => None,
        };

        // Fit the scaler on the selected raw features
        let cols: Vec<&str> = feature_names.iter().map(|s| s.as_str()).collect();
        let mut scaler = Scaler::new(cfg.scaler_type);
        scaler.fit(&prepared, &cols)?;
        let x_scaled = scale_matrix(&scaler, &x, &feature_names);

        let (train_idx, val_idx) = self.split_indices(&y)?;
        let x_train = x_scaled.select(Axis(0), &train_idx);
        let y_train = Array1::from_iter(train_idx.iter().map(|&i| y[i]));
        let x_val = x_scaled.select(Axis(0), &val_idx);
        let y_val = Array1::from_iter(val_idx.iter().map(|&i| y[i]));

        // Candidate comparison: explicit algorithm, or CV over the task's set
        let (algorithm, model_comparison) = match cfg.algorithm {
            Some(algorithm) => (algorithm, Vec::new()),
            None => self.auto_select(&x_train, &y_train)?,
        };

        // Optional random-search tuning on the training half
        let (params, tuning) = match cfg.tune_trials {
            Some(n_trials) => {
                let result = tuning::random_search(
                    algorithm,
                    cfg.task,
                    &x_train,
                    &y_train,
                    &TuningConfig {
                        n_trials,
                        cv_folds: cfg.cv_folds.min(3),
                        random_state: cfg.random_state,
                    },
                )?;
                (result.best_params.clone(), Some(result))
            }
            None => (cfg.params.clone(), None),
        };

        let model = fit_model(algorithm, cfg.task, &params, &x_train, &y_train)?;
        let y_pred = model
            .predict(&x_val)
            .map_err(|e| FastbreakError::TrainingError(e.to_string()))?;

        let (regression_metrics, classification_metrics) = match cfg.task {
            TaskType::Regression => (Some(evaluation::regression_metrics(&y_val, &y_pred)?), None),
            TaskType::BinaryClassification => (
                None,
                Some(evaluation::classification_metrics(&y_val, &y_pred)?),
            ),
        };

        let report = TrainingReport {
            algorithm: algorithm.as_str().to_string(),
            task: cfg.task,
            n_samples: x.nrows(),
            n_features: feature_names.len(),
            feature_names: feature_names.clone(),
            model_comparison,
            regression_metrics,
            classification_metrics,
            feature_selection,
            tuning,
            training_time_secs: start.elapsed().as_secs_f64(),
        };

        info!(
            algorithm = algorithm.as_str(),
            n_samples = report.n_samples,
            n_features = report.n_features,
            "training finished"
        );

        let bundle = ModelBundle::new(
            model,
            Some(scaler),
            feature_names,
            cfg.model_type,
            algorithm.as_str(),
        );
        Ok((bundle, report))
    }

    fn extract_target(&self, df: &DataFrame) -> Result<Array1<f64>> {
        let target = df
            .column(&self.config.target_column)
            .map_err(|_| FastbreakError::FeatureNotFound(self.config.target_column.clone()))?;
        let casted = target
            .cast(&DataType::Float64)
            .map_err(|e| FastbreakError::DataError(e.to_string()))?;
        Ok(casted
            .f64()
            .map_err(|e| FastbreakError::DataError(e.to_string()))?
            .into_iter()
            .map(|v| v.unwrap_or(0.0))
            .collect())
    }

    /// Shuffled train/validation split, stratified for classification
    fn split_indices(&self, y: &Array1<f64>) -> Result<(Vec<usize>, Vec<usize>)> {
        let n = y.len();
        if n < 5 {
            return Err(FastbreakError::TrainingError(format!(
                "need at least 5 samples to train, got {}",
                n
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.random_state);
        let val_size = ((n as f64) * self.config.validation_split).max(1.0) as usize;

        match self.config.task {
            TaskType::Regression => {
                let mut indices: Vec<usize> = (0..n).collect();
                indices.shuffle(&mut rng);
                let (val, train) = indices.split_at(val_size);
                Ok((train.to_vec(), val.to_vec()))
            }
            TaskType::BinaryClassification => {
                // Keep class proportions in both halves
                let mut train = Vec::new();
                let mut val = Vec::new();
                for class in [0.0, 1.0] {
                    let mut members: Vec<usize> = (0..n)
                        .filter(|&i| (y[i] - class).abs() < 0.5)
                        .collect();
                    members.shuffle(&mut rng);
                    let class_val = ((members.len() as f64) * self.config.validation_split)
                        .max(1.0) as usize;
                    let class_val = class_val.min(members.len().saturating_sub(1));
                    val.extend_from_slice(&members[..class_val]);
                    train.extend_from_slice(&members[class_val..]);
                }
                if train.is_empty() || val.is_empty() {
                    return Err(FastbreakError::TrainingError(
                        "stratified split produced an empty set".to_string(),
                    ));
                }
                Ok((train, val))
            }
        }
    }

    fn auto_select(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<(Algorithm, Vec<ModelScore>)> {
        let cfg = &self.config;
        let mut comparison = Vec::new();
        let mut best: Option<(Algorithm, f64)> = None;

        for &candidate in Algorithm::candidates(cfg.task) {
            let score = cross_val_score(
                candidate,
                cfg.task,
                &cfg.params,
                x,
                y,
                cfg.cv_folds,
                cfg.random_state,
            )?;
            info!(algorithm = candidate.as_str(), score, "candidate scored");
            comparison.push(ModelScore {
                algorithm: candidate.as_str().to_string(),
                cv_score: score,
            });
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate, score));
            }
        }

        let (algorithm, _) = best.ok_or_else(|| {
            FastbreakError::TrainingError("no candidate algorithm could be scored".to_string())
        })?;
        Ok((algorithm, comparison))
    }
}

/// Scale a feature matrix column-by-column with a fitted scaler.
fn scale_matrix(scaler: &Scaler, x: &Array2<f64>, names: &[String]) -> Array2<f64> {
    Array2::from_shape_fn((x.nrows(), x.ncols()), |(i, j)| {
        scaler.transform_value(&names[j], x[[i, j]])
    })
}

/// Construct and fit one model.
pub(crate) fn fit_model(
    algorithm: Algorithm,
    task: TaskType,
    params: &ModelParams,
    x: &Array2<f64>,
    y: &Array1<f64>,
) -> Result<TrainedModel> {
    match (algorithm, task) {
        (Algorithm::LinearRegression, TaskType::Regression) => {
            let mut model = LinearRegression::new().with_alpha(params.alpha);
            model.fit(x, y)?;
            Ok(TrainedModel::LinearRegression(model))
        }
        (Algorithm::LogisticRegression, TaskType::BinaryClassification) => {
            let mut model = LogisticRegression::new().with_alpha(params.alpha);
            model.fit(x, y)?;
            Ok(TrainedModel::LogisticRegression(model))
        }
        (Algorithm::RandomForest, task) => {
            let mut forest = match task {
                TaskType::Regression => RandomForest::new_regressor(params.n_estimators),
                TaskType::BinaryClassification => {
                    RandomForest::new_classifier(params.n_estimators)
                }
            };
            if let Some(depth) = params.max_depth {
                forest = forest.with_max_depth(depth);
            }
            forest.fit(x, y)?;
            Ok(match task {
                TaskType::Regression => TrainedModel::RandomForestRegressor(forest),
                TaskType::BinaryClassification => TrainedModel::RandomForestClassifier(forest),
            })
        }
        (algorithm, task) => Err(FastbreakError::TrainingError(format!(
            "{} does not support {:?}",
            algorithm.as_str(),
            task
        ))),
    }
}

/// Mean validation score across CV folds: R² for regression, accuracy for
/// classification.
pub(crate) fn cross_val_score(
    algorithm: Algorithm,
    task: TaskType,
    params: &ModelParams,
    x: &Array2<f64>,
    y: &Array1<f64>,
    folds: usize,
    seed: u64,
) -> Result<f64> {
    let strategy = match task {
        TaskType::Regression => CvStrategy::KFold {
            n_splits: folds,
            shuffle: true,
        },
        TaskType::BinaryClassification => CvStrategy::StratifiedKFold {
            n_splits: folds,
            shuffle: true,
        },
    };
    let splits = CrossValidator::new(strategy)
        .with_random_state(seed)
        .split(x.nrows(), Some(y))?;

    let mut scores = Vec::with_capacity(splits.len());
    for split in &splits {
        if split.test_indices.is_empty() || split.train_indices.is_empty() {
            continue;
        }
        let x_train = x.select(Axis(0), &split.train_indices);
        let y_train = Array1::from_iter(split.train_indices.iter().map(|&i| y[i]));
        let x_test = x.select(Axis(0), &split.test_indices);
        let y_test = Array1::from_iter(split.test_indices.iter().map(|&i| y[i]));

        let model = fit_model(algorithm, task, params, &x_train, &y_train)?;
        let y_pred = model.predict(&x_test)?;

        let score = match task {
            TaskType::Regression => evaluation::regression_metrics(&y_test, &y_pred)?.r2,
            TaskType::BinaryClassification => {
                evaluation::classification_metrics(&y_test, &y_pred)?.accuracy
            }
        };
        scores.push(score);
    }

    if scores.is_empty() {
        return Err(FastbreakError::TrainingError(
            "cross-validation produced no scores".to_string(),
        ));
    }
    Ok(scores.iter().sum::<f64>() / scores.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::PredictorCapability;

    fn regression_frame(n: usize) -> DataFrame {
        let minutes: Vec<f64> = (0..n).map(|i| 10.0 + i as f64).collect();
        let shots: Vec<f64> = (0..n).map(|i| 5.0 + (i % 7) as f64).collect();
        let points: Vec<f64> = minutes
            .iter()
            .zip(shots.iter())
            .map(|(m, s)| 0.6 * m + 1.1 * s)
            .collect();
        DataFrame::new(vec![
            Series::new("minutes".into(), &minutes).into(),
            Series::new("field_goals_attempted".into(), &shots).into(),
            Series::new("points".into(), &points).into(),
        ])
        .unwrap()
    }

    fn classification_frame(n: usize) -> DataFrame {
        let minutes: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let injured: Vec<f64> = minutes
            .iter()
            .map(|&m| if m > n as f64 / 2.0 { 1.0 } else { 0.0 })
            .collect();
        DataFrame::new(vec![
            Series::new("minutes_last_7_days".into(), &minutes).into(),
            Series::new("injured".into(), &injured).into(),
        ])
        .unwrap()
    }

    #[test]
    fn test_train_explicit_linear_regression() {
        let df = regression_frame(40);
        let config = TrainerConfig::new(TaskType::Regression, "points", ModelKind::PlayerPerformance)
            .with_algorithm(Algorithm::LinearRegression);
        let (bundle, report) = Trainer::new(config).fit(&df).unwrap();

        assert_eq!(report.algorithm, "linear_regression");
        assert!(report.regression_metrics.as_ref().unwrap().r2 > 0.9);
        assert!(bundle.feature_names.contains(&"minutes".to_string()));
        assert!(!bundle.feature_names.contains(&"points".to_string()));
        assert!(matches!(
            bundle.capability(),
            PredictorCapability::Regressor { .. }
        ));
    }

    #[test]
    fn test_auto_selection_produces_comparison() {
        let df = regression_frame(30);
        let mut config =
            TrainerConfig::new(TaskType::Regression, "points", ModelKind::PlayerPerformance);
        config.params.n_estimators = 10;
        let (_, report) = Trainer::new(config).fit(&df).unwrap();
        assert_eq!(report.model_comparison.len(), 2);
    }

    #[test]
    fn test_train_classifier() {
        let df = classification_frame(40);
        let config =
            TrainerConfig::new(TaskType::BinaryClassification, "injured", ModelKind::InjuryRisk)
                .with_algorithm(Algorithm::LogisticRegression);
        let (bundle, report) = Trainer::new(config).fit(&df).unwrap();

        assert!(report.classification_metrics.as_ref().unwrap().accuracy > 0.7);
        assert_eq!(bundle.capability(), PredictorCapability::Classifier);
    }

    #[test]
    fn test_feature_selection_limits_features() {
        let df = regression_frame(30);
        let config = TrainerConfig::new(TaskType::Regression, "points", ModelKind::PlayerPerformance)
            .with_algorithm(Algorithm::LinearRegression)
            .with_top_features(1);
        let (bundle, report) = Trainer::new(config).fit(&df).unwrap();
        assert_eq!(bundle.feature_names.len(), 1);
        assert!(report.feature_selection.is_some());
    }

    #[test]
    fn test_tuning_recorded_in_report() {
        let df = regression_frame(30);
        let config = TrainerConfig::new(TaskType::Regression, "points", ModelKind::PlayerPerformance)
            .with_algorithm(Algorithm::LinearRegression)
            .with_tuning(4);
        let (_, report) = Trainer::new(config).fit(&df).unwrap();

        let tuning = report.tuning.unwrap();
        assert_eq!(tuning.trials.len(), 4);
        assert!(tuning.best_score.is_finite());
    }

    #[test]
    fn test_missing_target_errors() {
        let df = regression_frame(20);
        let config =
            TrainerConfig::new(TaskType::Regression, "not_a_column", ModelKind::PlayerPerformance);
        assert!(Trainer::new(config).fit(&df).is_err());
    }
}
