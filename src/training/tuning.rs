//! Hyperparameter tuning
//!
//! Seeded random search over a small numeric space, scored by K-fold
//! cross-validation. Every trial is recorded in the result so a run's
//! history lives in an explicit value, not in the tuner.

use super::{cross_val_score, Algorithm, ModelParams, TaskType};
use crate::error::Result;
use ndarray::{Array1, Array2};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::debug;

/// Search parameters
#[derive(Debug, Clone)]
pub struct TuningConfig {
    pub n_trials: usize,
    pub cv_folds: usize,
    pub random_state: u64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            n_trials: 20,
            cv_folds: 3,
            random_state: 42,
        }
    }
}

/// One evaluated parameter set
#[derive(Debug, Clone, Serialize)]
pub struct Trial {
    pub params: ModelParams,
    pub score: f64,
}

/// Outcome of a search run
#[derive(Debug, Clone, Serialize)]
pub struct TuningResult {
    pub best_params: ModelParams,
    pub best_score: f64,
    pub trials: Vec<Trial>,
}

fn sample_params(algorithm: Algorithm, rng: &mut ChaCha8Rng) -> ModelParams {
    match algorithm {
        Algorithm::RandomForest => ModelParams {
            n_estimators: rng.gen_range(20..=200),
            max_depth: if rng.gen_bool(0.3) {
                None
            } else {
                Some(rng.gen_range(2..=12))
            },
            alpha: 0.0,
        },
        Algorithm::LinearRegression | Algorithm::LogisticRegression => ModelParams {
            n_estimators: ModelParams::default().n_estimators,
            max_depth: None,
            alpha: 10f64.powf(rng.gen_range(-4.0..1.0)),
        },
    }
}

/// Random search: sample parameter sets, CV-score each, keep the best.
pub fn random_search(
    algorithm: Algorithm,
    task: TaskType,
    x: &Array2<f64>,
    y: &Array1<f64>,
    config: &TuningConfig,
) -> Result<TuningResult> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.random_state);
    let mut trials = Vec::with_capacity(config.n_trials);
    let mut best: Option<(ModelParams, f64)> = None;

    for trial_idx in 0..config.n_trials {
        let params = sample_params(algorithm, &mut rng);
        let score = cross_val_score(
            algorithm,
            task,
            &params,
            x,
            y,
            config.cv_folds,
            config.random_state,
        )?;
        debug!(trial = trial_idx, score, ?params, "tuning trial");

        if best.as_ref().map_or(true, |&(_, s)| score > s) {
            best = Some((params.clone(), score));
        }
        trials.push(Trial { params, score });
    }

    let (best_params, best_score) = best.unwrap_or((ModelParams::default(), f64::NEG_INFINITY));
    Ok(TuningResult {
        best_params,
        best_score,
        trials,
    })
}
