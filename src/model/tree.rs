//! Decision tree used as the base learner for random forests

use crate::error::{FastbreakError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Split quality criterion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Variance reduction (regression)
    Variance,
}

/// A fitted tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

/// CART-style decision tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Number of features considered per split (forest subsampling)
    pub max_features: Option<usize>,
    pub criterion: Criterion,
    is_classification: bool,
}

impl DecisionTree {
    pub fn new_classifier() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            is_classification: true,
        }
    }

    pub fn new_regressor() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Variance,
            is_classification: false,
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

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        if x.nrows() != y.len() {
            return Err(FastbreakError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(FastbreakError::ValidationError(
                "cannot fit a tree on zero samples".to_string(),
            ));
        }

        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.root = Some(self.grow(x, y, &indices, 0));
        Ok(self)
    }

    fn grow(&self, x: &Array2<f64>, y: &Array1<f64>, indices: &[usize], depth: usize) -> TreeNode {
        let y_subset: Vec<f64> = indices.iter().map(|&i| y[i]).collect();

        let stop = indices.len() < self.min_samples_split
            || self.max_depth.map_or(false, |d| depth >= d)
            || is_pure(&y_subset);

        if stop {
            return TreeNode::Leaf {
                value: self.leaf_value(&y_subset),
            };
        }

        match self.best_split(x, y, indices) {
            Some((feature_idx, threshold)) => {
                let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| x[[i, feature_idx]] <= threshold);

                if left_idx.len() < self.min_samples_leaf || right_idx.len() < self.min_samples_leaf {
                    return TreeNode::Leaf {
                        value: self.leaf_value(&y_subset),
                    };
                }

                let left = Box::new(self.grow(x, y, &left_idx, depth + 1));
                let right = Box::new(self.grow(x, y, &right_idx, depth + 1));
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                }
            }
            None => TreeNode::Leaf {
                value: self.leaf_value(&y_subset),
            },
        }
    }

    fn best_split(&self, x: &Array2<f64>, y: &Array1<f64>, indices: &[usize]) -> Option<(usize, f64)> {
        let n_features = x.ncols();
        let n_to_scan = self.max_features.unwrap_or(n_features).min(n_features);

        let y_subset: Vec<f64> = indices.iter().map(|&i| y[i]).collect();
        let parent_impurity = self.impurity(&y_subset);

        let mut best: Option<(usize, f64, f64)> = None;

        for feature_idx in 0..n_to_scan {
            let mut values: Vec<f64> = indices.iter().map(|&i| x[[i, feature_idx]]).collect();
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            values.dedup();

            for window in values.windows(2) {
                let threshold = (window[0] + window[1]) / 2.0;

                let (left, right): (Vec<(f64, f64)>, Vec<(f64, f64)>) = indices
                    .iter()
                    .map(|&i| (x[[i, feature_idx]], y[i]))
                    .partition(|&(v, _)| v <= threshold);
                let left: Vec<f64> = left.into_iter().map(|(_, yi)| yi).collect();
                let right: Vec<f64> = right.into_iter().map(|(_, yi)| yi).collect();

                if left.len() < self.min_samples_leaf || right.len() < self.min_samples_leaf {
                    continue;
                }

                let n = indices.len() as f64;
                let weighted = (left.len() as f64 * self.impurity(&left)
                    + right.len() as f64 * self.impurity(&right))
                    / n;
                let gain = parent_impurity - weighted;

                if gain > 0.0 && best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature_idx, threshold, gain));
                }
            }
        }

        best.map(|(idx, threshold, _)| (idx, threshold))
    }

    fn impurity(&self, y: &[f64]) -> f64 {
        if y.is_empty() {
            return 0.0;
        }
        match self.criterion {
            Criterion::Gini => {
                let n = y.len() as f64;
                let mut counts: HashMap<i64, usize> = HashMap::new();
                for &v in y {
                    *counts.entry(v.round() as i64).or_insert(0) += 1;
                }
                1.0 - counts
                    .values()
                    .map(|&c| (c as f64 / n).powi(2))
                    .sum::<f64>()
            }
            Criterion::Variance => {
                let n = y.len() as f64;
                let mean = y.iter().sum::<f64>() / n;
                y.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / n
            }
        }
    }

    fn leaf_value(&self, y: &[f64]) -> f64 {
        if y.is_empty() {
            return 0.0;
        }
        if self.is_classification {
            let mut counts: HashMap<i64, usize> = HashMap::new();
            for &v in y {
                *counts.entry(v.round() as i64).or_insert(0) += 1;
            }
            counts
                .into_iter()
                .max_by_key(|&(_, count)| count)
                .map(|(class, _)| class as f64)
                .unwrap_or(0.0)
        } else {
            y.iter().sum::<f64>() / y.len() as f64
        }
    }

    /// Predict one value per row
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(FastbreakError::ModelNotFitted)?;

        let predictions: Vec<f64> = (0..x.nrows())
            .map(|i| {
                let row = x.row(i).to_vec();
                predict_one(root, &row)
            })
            .collect();

        Ok(Array1::from_vec(predictions))
    }
}

fn predict_one(node: &TreeNode, sample: &[f64]) -> f64 {
    match node {
        TreeNode::Leaf { value } => *value,
        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
        } => {
            if sample[*feature_idx] <= *threshold {
                predict_one(left, sample)
            } else {
                predict_one(right, sample)
            }
        }
    }
}

fn is_pure(y: &[f64]) -> bool {
    match y.first() {
        None => true,
        Some(&first) => y.iter().all(|&v| (v - first).abs() < 1e-12),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_separable() {
        let x = array![[0.0], [0.2], [0.4], [2.0], [2.2], [2.4]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        let predictions = tree.predict(&x).unwrap();
        for (p, t) in predictions.iter().zip(y.iter()) {
            assert_eq!(p, t);
        }
    }

    #[test]
    fn test_regressor_step_function() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = array![5.0, 5.0, 5.0, 20.0, 20.0, 20.0];

        let mut tree = DecisionTree::new_regressor();
        tree.fit(&x, &y).unwrap();

        let predictions = tree.predict(&array![[2.0], [11.0]]).unwrap();
        assert!((predictions[0] - 5.0).abs() < 1e-9);
        assert!((predictions[1] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_unfitted_tree_errors() {
        let tree = DecisionTree::new_regressor();
        assert!(tree.predict(&array![[1.0]]).is_err());
    }
}
