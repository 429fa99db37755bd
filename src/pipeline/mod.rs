//! Feature pipeline
//!
//! Deterministic transform from a raw record to an ordered numeric vector:
//! feature engineering, missing-value imputation, alignment to the bundle's
//! feature list, and scaling — in that fixed order. Pure given the read-only
//! bundle: no shared mutable state across calls.
//!
//! The row path ([`build_vector`]) serves single predictions and the
//! row-parallel batch strategy; the frame path ([`transform_frame`]) serves
//! the vectorized strategy, where batch-wide statistics (median imputation)
//! become available. Both paths share the same engineering table, imputation
//! policy, and scaler parameters.

pub mod engineering;
pub mod imputation;
mod scaler;

pub use scaler::{Scaler, ScalerType};

use crate::bundle::ModelBundle;
use crate::data::{coerce_numeric, Record};
use crate::error::{FastbreakError, Result};
use ndarray::Array2;
use polars::prelude::*;

/// Ordered numeric vector aligned with the bundle's feature list
pub type FeatureVector = Vec<f64>;

/// Build the feature vector for one record.
pub fn build_vector(record: &Record, bundle: &ModelBundle) -> Result<FeatureVector> {
    let engineered = engineering::engineer_record(record, bundle.model_type);
    let imputed = imputation::impute_record(&engineered, &bundle.feature_names);

    let mut vector = align_record(&imputed, &bundle.feature_names)?;

    if let Some(ref scaler) = bundle.scaler {
        let names = aligned_names(&imputed, &bundle.feature_names);
        for (value, name) in vector.iter_mut().zip(names.iter()) {
            *value = scaler.transform_value(name, *value);
        }
    }

    if vector.iter().any(|v| !v.is_finite()) {
        return Err(FastbreakError::Preprocessing(
            "feature vector contains non-finite values".to_string(),
        ));
    }

    Ok(vector)
}

/// Align an imputed record to the bundle's feature order. Absent features
/// default to 0 and extra fields are dropped. Legacy bundles (empty feature
/// list) pass all numeric fields through in original record order.
fn align_record(imputed: &Record, feature_names: &[String]) -> Result<FeatureVector> {
    if feature_names.is_empty() {
        return Ok(imputed
            .iter()
            .filter_map(|(_, value)| coerce_numeric(value))
            .collect());
    }

    feature_names
        .iter()
        .map(|name| match imputed.get(name) {
            None => Ok(0.0),
            Some(value) => coerce_numeric(value).ok_or_else(|| {
                FastbreakError::Preprocessing(format!(
                    "non-numeric value for feature '{}': {}",
                    name, value
                ))
            }),
        })
        .collect()
}

/// Feature names corresponding to the aligned vector positions.
fn aligned_names(imputed: &Record, feature_names: &[String]) -> Vec<String> {
    if feature_names.is_empty() {
        imputed
            .iter()
            .filter(|(_, value)| coerce_numeric(value).is_some())
            .map(|(name, _)| name.clone())
            .collect()
    } else {
        feature_names.to_vec()
    }
}

/// Transform a tabulated batch into the aligned, scaled feature matrix for
/// one bulk predict call. Applies the same four steps as the row path, with
/// imputation operating on the whole table.
pub fn transform_frame(df: &DataFrame, bundle: &ModelBundle) -> Result<Array2<f64>> {
    let engineered = engineering::engineer_frame(df, bundle.model_type)?;
    let imputed = imputation::impute_frame(&engineered, &bundle.feature_names)?;

    let feature_cols: Vec<String> = if bundle.feature_names.is_empty() {
        imputed
            .get_columns()
            .iter()
            .filter(|c| c.dtype() != &DataType::String)
            .map(|c| c.name().to_string())
            .collect()
    } else {
        bundle.feature_names.clone()
    };

    let aligned = select_columns(&imputed, &feature_cols)?;

    let scaled = match bundle.scaler {
        Some(ref scaler) => scaler.transform_frame(&aligned)?,
        None => aligned,
    };

    let matrix = columns_to_array2(&scaled, &feature_cols)?;

    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(FastbreakError::Preprocessing(
            "feature matrix contains non-finite values".to_string(),
        ));
    }

    Ok(matrix)
}

/// Select the feature columns in order; absent columns become zeros. A
/// string-typed column under a feature name means at least one record
/// carried a non-coercible value — the bulk path rejects the whole table
/// rather than silently zeroing, so the fallback can surface per-record
/// errors instead.
fn select_columns(df: &DataFrame, feature_cols: &[String]) -> Result<DataFrame> {
    let height = df.height();
    let columns: Vec<Column> = feature_cols
        .iter()
        .map(|name| match df.column(name) {
            Ok(column) if column.dtype() == &DataType::String => {
                Err(FastbreakError::Preprocessing(format!(
                    "non-numeric column for feature '{}'",
                    name
                )))
            }
            Ok(column) => Ok(column.clone()),
            Err(_) => {
                let zeros = vec![0.0_f64; height];
                Ok(Series::new(name.as_str().into(), &zeros).into())
            }
        })
        .collect::<Result<Vec<_>>>()?;

    if columns.is_empty() {
        return Ok(DataFrame::empty());
    }
    DataFrame::new(columns).map_err(|e| FastbreakError::DataError(e.to_string()))
}

/// Extract named columns into a row-major Array2<f64>.
pub(crate) fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let n_cols = col_names.len();

    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|col_name| {
            let column = df
                .column(col_name)
                .map_err(|_| FastbreakError::FeatureNotFound(col_name.clone()))?;
            let casted = column
                .cast(&DataType::Float64)
                .map_err(|e| FastbreakError::Preprocessing(e.to_string()))?;
            let values: Vec<f64> = casted
                .f64()
                .map_err(|e| FastbreakError::DataError(e.to_string()))?
                .into_iter()
                .map(|v| v.unwrap_or(0.0))
                .collect();
            Ok(values)
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;

    let col_refs: Vec<&[f64]> = col_data.iter().map(|c| c.as_slice()).collect();
    Ok(Array2::from_shape_fn((n_rows, n_cols), |(r, c)| {
        col_refs[c][r]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::ModelKind;
    use crate::model::{LinearRegression, TrainedModel};
    use ndarray::array;
    use serde_json::{json, Value};

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn performance_bundle(feature_names: &[&str], scaler: Option<Scaler>) -> ModelBundle {
        let mut model = LinearRegression::new();
        let n = feature_names.len().max(1);
        let x = Array2::from_shape_fn((4, n), |(i, j)| (i + j) as f64);
        let y = array![1.0, 2.0, 3.0, 4.0];
        model.fit(&x, &y).unwrap();

        ModelBundle::new(
            TrainedModel::LinearRegression(model),
            scaler,
            feature_names.iter().map(|s| s.to_string()).collect(),
            ModelKind::PlayerPerformance,
            "linear_regression",
        )
    }

    #[test]
    fn test_vector_length_matches_feature_names() {
        let bundle = performance_bundle(&["points", "minutes", "usage_rate"], None);
        let rec = record(json!({"points": 20.0, "rebounds": 5.0}));
        let vector = build_vector(&rec, &bundle).unwrap();
        assert_eq!(vector.len(), 3);
        assert_eq!(vector[0], 20.0);
        assert_eq!(vector[1], 0.0); // minutes imputed
        assert_eq!(vector[2], 0.0); // usage_rate imputed; rebounds dropped
    }

    #[test]
    fn test_engineered_feature_feeds_alignment() {
        let bundle = performance_bundle(&["shooting_efficiency"], None);
        let rec = record(json!({"points": 30.0, "field_goals_attempted": 15.0}));
        let vector = build_vector(&rec, &bundle).unwrap();
        assert!((vector[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_non_coercible_value_is_preprocessing_error() {
        let bundle = performance_bundle(&["points"], None);
        let rec = record(json!({"points": "thirty"}));
        let err = build_vector(&rec, &bundle).unwrap_err();
        assert!(matches!(err, FastbreakError::Preprocessing(_)));
    }

    #[test]
    fn test_legacy_bundle_passes_columns_in_order() {
        let bundle = performance_bundle(&[], None);
        let rec = record(json!({"b": 2.0, "a": 1.0, "position": "Guard"}));
        let vector = build_vector(&rec, &bundle).unwrap();
        // Original record order preserved; categorical dropped
        assert_eq!(vector, vec![2.0, 1.0]);
    }

    #[test]
    fn test_build_vector_is_deterministic() {
        let bundle = performance_bundle(&["points", "age", "usage_rate"], None);
        let rec = record(json!({"points": 18.0}));
        assert_eq!(
            build_vector(&rec, &bundle).unwrap(),
            build_vector(&rec, &bundle).unwrap()
        );
    }

    #[test]
    fn test_row_and_frame_paths_agree_on_complete_records() {
        let bundle = performance_bundle(&["points", "minutes", "points_per_minute"], None);
        let records: Vec<Record> = vec![
            record(json!({"points": 24.0, "minutes": 32.0})),
            record(json!({"points": 11.0, "minutes": 20.0})),
        ];

        let tab = crate::data::tabulate(&records).unwrap();
        let matrix = transform_frame(&tab.frame, &bundle).unwrap();

        for (i, rec) in records.iter().enumerate() {
            let vector = build_vector(rec, &bundle).unwrap();
            for (j, v) in vector.iter().enumerate() {
                assert!(
                    (matrix[[i, j]] - v).abs() < 1e-9,
                    "mismatch at row {} col {}",
                    i,
                    j
                );
            }
        }
    }

    #[test]
    fn test_scaling_applied_in_both_paths() {
        let train = DataFrame::new(vec![
            Series::new("points".into(), &[10.0, 20.0, 30.0]).into(),
        ])
        .unwrap();
        let mut scaler = Scaler::new(ScalerType::Standard);
        scaler.fit(&train, &["points"]).unwrap();

        let bundle = performance_bundle(&["points"], Some(scaler.clone()));
        let rec = record(json!({"points": 20.0}));
        let vector = build_vector(&rec, &bundle).unwrap();
        assert!(vector[0].abs() < 1e-9); // 20 is the mean

        let tab = crate::data::tabulate(&[rec]).unwrap();
        let matrix = transform_frame(&tab.frame, &bundle).unwrap();
        assert!(matrix[[0, 0]].abs() < 1e-9);
    }
}
