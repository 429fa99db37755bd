//! Random forest with per-member prediction access
//!
//! The regressor exposes each tree's predictions so the serving layer can
//! derive a disagreement-based confidence for point estimates.

use crate::error::{FastbreakError, Result};
use super::tree::DecisionTree;
use ndarray::{Array1, Array2, Axis};
use rand::RngCore;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bagged ensemble of decision trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub random_state: u64,
    is_classification: bool,
    /// Sorted unique class labels (classification only)
    classes: Vec<f64>,
}

impl RandomForest {
    pub fn new_classifier(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            random_state: 42,
            is_classification: true,
            classes: Vec::new(),
        }
    }

    pub fn new_regressor(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            random_state: 42,
            is_classification: false,
            classes: Vec::new(),
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn is_classifier(&self) -> bool {
        self.is_classification
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Fit the forest on bootstrap samples, one seeded RNG per tree
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(FastbreakError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(FastbreakError::ValidationError(
                "cannot fit a forest on zero samples".to_string(),
            ));
        }

        if self.is_classification {
            let mut classes: Vec<f64> = y.iter().copied().collect();
            classes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            classes.dedup();
            self.classes = classes;
        }

        let max_features = ((n_features as f64).sqrt().ceil() as usize).max(1);
        let base_seed = self.random_state;

        let trees: Vec<DecisionTree> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));

                let sample_indices: Vec<usize> = (0..n_samples)
                    .map(|_| (rng.next_u64() as usize) % n_samples)
                    .collect();

                let x_boot = x.select(Axis(0), &sample_indices);
                let y_boot: Array1<f64> =
                    Array1::from_vec(sample_indices.iter().map(|&i| y[i]).collect());

                let mut tree = if self.is_classification {
                    DecisionTree::new_classifier()
                } else {
                    DecisionTree::new_regressor()
                };
                if let Some(d) = self.max_depth {
                    tree = tree.with_max_depth(d);
                }
                tree = tree
                    .with_min_samples_split(self.min_samples_split)
                    .with_min_samples_leaf(self.min_samples_leaf);
                tree.max_features = Some(max_features);

                tree.fit(&x_boot, &y_boot).ok();
                tree
            })
            .collect();

        self.trees = trees;
        Ok(self)
    }

    /// Majority vote (classification) or tree mean (regression)
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let member_preds = self.collect_member_predictions(x)?;
        let n_samples = x.nrows();

        let predictions: Vec<f64> = if self.is_classification {
            (0..n_samples)
                .map(|i| {
                    let mut votes: HashMap<i64, usize> = HashMap::new();
                    for preds in &member_preds {
                        *votes.entry(preds[i].round() as i64).or_insert(0) += 1;
                    }
                    votes
                        .into_iter()
                        .max_by_key(|&(_, count)| count)
                        .map(|(class, _)| class as f64)
                        .unwrap_or(0.0)
                })
                .collect()
        } else {
            (0..n_samples)
                .map(|i| {
                    member_preds.iter().map(|p| p[i]).sum::<f64>() / member_preds.len() as f64
                })
                .collect()
        };

        Ok(Array1::from_vec(predictions))
    }

    /// Class probabilities from tree vote shares (classification only)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_classification {
            return Err(FastbreakError::Prediction(
                "predict_proba is only available for classifiers".to_string(),
            ));
        }

        let member_preds = self.collect_member_predictions(x)?;
        let n_samples = x.nrows();
        let n_classes = self.classes.len();

        let mut proba = Array2::zeros((n_samples, n_classes));
        for i in 0..n_samples {
            for preds in &member_preds {
                let class = preds[i].round() as i64;
                if let Some(j) = self
                    .classes
                    .iter()
                    .position(|&c| c.round() as i64 == class)
                {
                    proba[[i, j]] += 1.0;
                }
            }
            let row_sum: f64 = proba.row(i).sum();
            if row_sum > 0.0 {
                for j in 0..n_classes {
                    proba[[i, j]] /= row_sum;
                }
            }
        }

        Ok(proba)
    }

    /// Per-tree predictions, one Array1 per member. Used by the serving
    /// layer for ensemble-disagreement confidence on regressors.
    pub fn member_predictions(&self, x: &Array2<f64>) -> Result<Vec<Array1<f64>>> {
        self.collect_member_predictions(x)
    }

    fn collect_member_predictions(&self, x: &Array2<f64>) -> Result<Vec<Array1<f64>>> {
        if self.trees.is_empty() {
            return Err(FastbreakError::ModelNotFitted);
        }

        let member_preds: Vec<Array1<f64>> = self
            .trees
            .par_iter()
            .filter_map(|tree| tree.predict(x).ok())
            .collect();

        if member_preds.is_empty() {
            return Err(FastbreakError::Prediction(
                "no ensemble member could predict".to_string(),
            ));
        }

        Ok(member_preds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable_data() -> (Array2<f64>, Array1<f64>) {
        (
            array![
                [0.0, 0.1],
                [0.1, 0.2],
                [0.2, 0.0],
                [2.0, 2.1],
                [2.1, 2.2],
                [2.2, 2.0],
            ],
            array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        )
    }

    #[test]
    fn test_classifier_accuracy() {
        let (x, y) = separable_data();
        let mut rf = RandomForest::new_classifier(15).with_random_state(42);
        rf.fit(&x, &y).unwrap();

        let predictions = rf.predict(&x).unwrap();
        let correct = predictions
            .iter()
            .zip(y.iter())
            .filter(|(p, t)| (*p - *t).abs() < 0.5)
            .count();
        assert!(correct >= 5, "only {} of 6 correct", correct);
    }

    #[test]
    fn test_proba_rows_sum_to_one() {
        let (x, y) = separable_data();
        let mut rf = RandomForest::new_classifier(15).with_random_state(42);
        rf.fit(&x, &y).unwrap();

        let proba = rf.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 2);
        for i in 0..proba.nrows() {
            let sum: f64 = proba.row(i).sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_regressor_member_predictions() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![2.0, 4.0, 6.0, 8.0, 10.0, 12.0];

        let mut rf = RandomForest::new_regressor(10).with_random_state(7);
        rf.fit(&x, &y).unwrap();

        let members = rf.member_predictions(&array![[3.5]]).unwrap();
        assert!(!members.is_empty());
        for m in &members {
            assert_eq!(m.len(), 1);
        }
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

        let mut a = RandomForest::new_regressor(8).with_random_state(11);
        let mut b = RandomForest::new_regressor(8).with_random_state(11);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();

        let pa = a.predict(&x).unwrap();
        let pb = b.predict(&x).unwrap();
        for (va, vb) in pa.iter().zip(pb.iter()) {
            assert_eq!(va, vb);
        }
    }

    #[test]
    fn test_proba_on_regressor_errors() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![1.0, 2.0, 3.0];
        let mut rf = RandomForest::new_regressor(5);
        rf.fit(&x, &y).unwrap();
        assert!(rf.predict_proba(&x).is_err());
    }
}
