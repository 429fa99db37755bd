//! Trained model variants
//!
//! The pipeline treats training algorithms as a black-box fit/predict
//! capability. [`TrainedModel`] is the closed set of predictors a bundle can
//! carry; whether a variant is a classifier (and whether it exposes ensemble
//! members) is resolved once at bundle-load time, not re-probed per call.

pub mod forest;
pub mod linear;
pub mod tree;

pub use forest::RandomForest;
pub use linear::{LinearRegression, LogisticRegression};
pub use tree::{Criterion, DecisionTree, TreeNode};

use crate::error::{FastbreakError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Closed union of trained predictors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrainedModel {
    LinearRegression(LinearRegression),
    LogisticRegression(LogisticRegression),
    RandomForestRegressor(RandomForest),
    RandomForestClassifier(RandomForest),
}

impl TrainedModel {
    /// Canonical algorithm tag used in result documents
    pub fn algorithm_name(&self) -> &'static str {
        match self {
            TrainedModel::LinearRegression(_) => "linear_regression",
            TrainedModel::LogisticRegression(_) => "logistic_regression",
            TrainedModel::RandomForestRegressor(_) => "random_forest",
            TrainedModel::RandomForestClassifier(_) => "random_forest",
        }
    }

    pub fn is_classifier(&self) -> bool {
        matches!(
            self,
            TrainedModel::LogisticRegression(_) | TrainedModel::RandomForestClassifier(_)
        )
    }

    /// Point predictions, one per row
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            TrainedModel::LinearRegression(m) => m.predict(x),
            TrainedModel::LogisticRegression(m) => m.predict(x),
            TrainedModel::RandomForestRegressor(m) => m.predict(x),
            TrainedModel::RandomForestClassifier(m) => m.predict(x),
        }
    }

    /// Class probabilities, rows × classes. Errors for regressors.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match self {
            TrainedModel::LogisticRegression(m) => {
                let pos = m.predict_proba(x)?;
                let mut proba = Array2::zeros((pos.len(), 2));
                for (i, &p) in pos.iter().enumerate() {
                    proba[[i, 0]] = 1.0 - p;
                    proba[[i, 1]] = p;
                }
                Ok(proba)
            }
            TrainedModel::RandomForestClassifier(m) => m.predict_proba(x),
            TrainedModel::LinearRegression(_) | TrainedModel::RandomForestRegressor(_) => {
                Err(FastbreakError::Prediction(
                    "predict_proba is only available for classifiers".to_string(),
                ))
            }
        }
    }

    /// Class labels aligned with predict_proba columns (classifiers only)
    pub fn classes(&self) -> Option<Vec<f64>> {
        match self {
            TrainedModel::LogisticRegression(_) => Some(vec![0.0, 1.0]),
            TrainedModel::RandomForestClassifier(m) => Some(m.classes().to_vec()),
            _ => None,
        }
    }

    /// Per-member predictions for ensemble regressors, None otherwise
    pub fn member_predictions(&self, x: &Array2<f64>) -> Option<Result<Vec<Array1<f64>>>> {
        match self {
            TrainedModel::RandomForestRegressor(m) => Some(m.member_predictions(x)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_logistic_proba_has_two_columns() {
        let x = array![[0.0], [1.0], [4.0], [5.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut inner = LogisticRegression::new();
        inner.fit(&x, &y).unwrap();
        let model = TrainedModel::LogisticRegression(inner);

        assert!(model.is_classifier());
        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 2);
        for i in 0..proba.nrows() {
            assert!((proba.row(i).sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_regressor_has_no_proba() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![1.0, 2.0, 3.0];

        let mut inner = LinearRegression::new();
        inner.fit(&x, &y).unwrap();
        let model = TrainedModel::LinearRegression(inner);

        assert!(!model.is_classifier());
        assert!(model.predict_proba(&x).is_err());
        assert!(model.member_predictions(&x).is_none());
    }

    #[test]
    fn test_forest_regressor_exposes_members() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

        let mut inner = RandomForest::new_regressor(5).with_random_state(3);
        inner.fit(&x, &y).unwrap();
        let model = TrainedModel::RandomForestRegressor(inner);

        let members = model.member_predictions(&array![[2.5]]).unwrap().unwrap();
        assert!(!members.is_empty());
    }
}
