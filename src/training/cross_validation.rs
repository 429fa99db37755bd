//! Cross-validation splitters

use crate::error::{FastbreakError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

/// Cross-validation strategy
#[derive(Debug, Clone, Copy)]
pub enum CvStrategy {
    /// K-Fold cross-validation
    KFold { n_splits: usize, shuffle: bool },
    /// Stratified K-Fold (maintains class distribution)
    StratifiedKFold { n_splits: usize, shuffle: bool },
}

impl Default for CvStrategy {
    fn default() -> Self {
        CvStrategy::KFold {
            n_splits: 5,
            shuffle: true,
        }
    }
}

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CvSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Seeded cross-validation splitter
pub struct CrossValidator {
    strategy: CvStrategy,
    random_state: u64,
}

impl CrossValidator {
    pub fn new(strategy: CvStrategy) -> Self {
        Self {
            strategy,
            random_state: 42,
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Generate train/test splits. Stratification requires the target array.
    pub fn split(&self, n_samples: usize, y: Option<&Array1<f64>>) -> Result<Vec<CvSplit>> {
        match self.strategy {
            CvStrategy::KFold { n_splits, shuffle } => self.k_fold(n_samples, n_splits, shuffle),
            CvStrategy::StratifiedKFold { n_splits, shuffle } => {
                let y = y.ok_or_else(|| {
                    FastbreakError::ValidationError(
                        "stratified K-fold requires the target array".to_string(),
                    )
                })?;
                self.stratified_k_fold(n_samples, y, n_splits, shuffle)
            }
        }
    }

    fn validate(&self, n_samples: usize, n_splits: usize) -> Result<()> {
        if n_splits < 2 {
            return Err(FastbreakError::ValidationError(
                "n_splits must be at least 2".to_string(),
            ));
        }
        if n_samples < n_splits {
            return Err(FastbreakError::ValidationError(format!(
                "n_samples ({}) must be >= n_splits ({})",
                n_samples, n_splits
            )));
        }
        Ok(())
    }

    fn k_fold(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Result<Vec<CvSplit>> {
        self.validate(n_samples, n_splits)?;

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
            indices.shuffle(&mut rng);
        }

        let fold_size = n_samples / n_splits;
        let remainder = n_samples % n_splits;

        let mut splits = Vec::with_capacity(n_splits);
        let mut start = 0;
        for fold_idx in 0..n_splits {
            let size = fold_size + usize::from(fold_idx < remainder);
            let test_indices: Vec<usize> = indices[start..start + size].to_vec();
            let train_indices: Vec<usize> = indices[..start]
                .iter()
                .chain(indices[start + size..].iter())
                .copied()
                .collect();
            splits.push(CvSplit {
                train_indices,
                test_indices,
                fold_idx,
            });
            start += size;
        }

        Ok(splits)
    }

    fn stratified_k_fold(
        &self,
        n_samples: usize,
        y: &Array1<f64>,
        n_splits: usize,
        shuffle: bool,
    ) -> Result<Vec<CvSplit>> {
        self.validate(n_samples, n_splits)?;

        let mut class_indices: HashMap<i64, Vec<usize>> = HashMap::new();
        for (i, &label) in y.iter().enumerate() {
            class_indices
                .entry(label.round() as i64)
                .or_default()
                .push(i);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);

        // Distribute each class round-robin over the folds
        let mut fold_members: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut classes: Vec<i64> = class_indices.keys().copied().collect();
        classes.sort_unstable();

        for class in classes {
            let mut indices = class_indices.remove(&class).unwrap_or_default();
            if shuffle {
                indices.shuffle(&mut rng);
            }
            for (offset, idx) in indices.into_iter().enumerate() {
                fold_members[offset % n_splits].push(idx);
            }
        }

        let splits = (0..n_splits)
            .map(|fold_idx| {
                let test_indices = fold_members[fold_idx].clone();
                let train_indices: Vec<usize> = fold_members
                    .iter()
                    .enumerate()
                    .filter(|&(f, _)| f != fold_idx)
                    .flat_map(|(_, members)| members.iter().copied())
                    .collect();
                CvSplit {
                    train_indices,
                    test_indices,
                    fold_idx,
                }
            })
            .collect();

        Ok(splits)
    }
}
