//! Statistical feature selection
//!
//! Variance filter, |Pearson| ranking against the target, and a greedy
//! redundancy filter that skips features highly correlated with an
//! already-selected one. Deterministic: no sampling involved.

use crate::error::{FastbreakError, Result};
use ndarray::{Array1, Array2};
use serde::Serialize;

/// Selection parameters
#[derive(Debug, Clone)]
pub struct SelectionConfig {
    /// Number of features to keep
    pub top_k: usize,
    /// Features with variance at or below this are dropped outright
    pub variance_threshold: f64,
    /// Candidates correlated above this with a selected feature are skipped
    pub redundancy_threshold: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            variance_threshold: 0.0,
            redundancy_threshold: 0.95,
        }
    }
}

/// Per-feature scores from the ranking pass
#[derive(Debug, Clone, Serialize)]
pub struct FeatureScore {
    pub name: String,
    pub target_correlation: f64,
    pub variance: f64,
}

/// Outcome of a selection run
#[derive(Debug, Clone, Serialize)]
pub struct SelectionResult {
    pub selected: Vec<String>,
    pub scores: Vec<FeatureScore>,
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    if var_a == 0.0 || var_b == 0.0 {
        return 0.0;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

/// Rank features against the target and keep the top-k non-redundant ones.
pub fn select_features(
    x: &Array2<f64>,
    y: &Array1<f64>,
    names: &[String],
    config: &SelectionConfig,
) -> Result<SelectionResult> {
    if x.ncols() != names.len() {
        return Err(FastbreakError::ShapeError {
            expected: format!("{} feature names", x.ncols()),
            actual: format!("{} feature names", names.len()),
        });
    }
    if x.nrows() != y.len() {
        return Err(FastbreakError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }

    let target: Vec<f64> = y.to_vec();
    let columns: Vec<Vec<f64>> = (0..x.ncols()).map(|j| x.column(j).to_vec()).collect();

    let mut scores: Vec<FeatureScore> = names
        .iter()
        .enumerate()
        .map(|(j, name)| FeatureScore {
            name: name.clone(),
            target_correlation: pearson(&columns[j], &target),
            variance: variance(&columns[j]),
        })
        .collect();

    // Rank by |correlation|, strongest first
    let mut ranked: Vec<usize> = (0..scores.len()).collect();
    ranked.sort_by(|&a, &b| {
        scores[b]
            .target_correlation
            .abs()
            .partial_cmp(&scores[a].target_correlation.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut selected_idx: Vec<usize> = Vec::new();
    for &candidate in &ranked {
        if selected_idx.len() >= config.top_k {
            break;
        }
        if scores[candidate].variance <= config.variance_threshold {
            continue;
        }
        let redundant = selected_idx.iter().any(|&kept| {
            pearson(&columns[candidate], &columns[kept]).abs() > config.redundancy_threshold
        });
        if !redundant {
            selected_idx.push(candidate);
        }
    }

    let selected = selected_idx
        .iter()
        .map(|&j| names[j].clone())
        .collect();

    scores.sort_by(|a, b| {
        b.target_correlation
            .abs()
            .partial_cmp(&a.target_correlation.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(SelectionResult { selected, scores })
}
