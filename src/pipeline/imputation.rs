//! Missing-value imputation
//!
//! The fill policy is keyed on the feature name, not the model: rate and
//! percentage features default to 0, minutes-style workload counters default
//! to 0, physical attributes (age, height, weight) take the columnwise
//! median when a batch distribution exists and a fixed fallback constant for
//! single records, and everything else numeric defaults to 0. Categorical
//! fields default to the sentinel "Unknown".
//!
//! Both execution paths share this policy, which keeps imputation
//! deterministic and the two strategies consistent.

use crate::data::Record;
use crate::error::Result;
use polars::prelude::*;
use serde_json::Value;

/// Sentinel for missing categorical values
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Fixed fallbacks for physical attributes when no distribution is available
/// (single-record prediction, or a batch column that is entirely null).
fn physical_fallback(name: &str) -> Option<f64> {
    match name {
        "age" => Some(25.0),
        "height" => Some(200.0),
        "weight" => Some(100.0),
        _ => None,
    }
}

fn is_physical(name: &str) -> bool {
    physical_fallback(name).is_some()
}

/// Single-record fill value for a numeric feature name.
pub fn fill_value_for(name: &str) -> f64 {
    if name.ends_with("_percentage") || name.ends_with("_rate") {
        0.0
    } else if name.starts_with("minutes") {
        0.0
    } else if let Some(fallback) = physical_fallback(name) {
        fallback
    } else {
        0.0
    }
}

/// Impute a single record: null values of expected features and expected
/// features that are absent get the policy default; null values of other
/// fields become the categorical sentinel.
pub fn impute_record(record: &Record, feature_names: &[String]) -> Record {
    let mut out = Record::new();

    for (name, value) in record {
        if value.is_null() {
            let filled = if feature_names.iter().any(|f| f == name) || looks_numeric(name) {
                number(fill_value_for(name))
            } else {
                Value::String(UNKNOWN_CATEGORY.to_string())
            };
            out.insert(name.clone(), filled);
        } else {
            out.insert(name.clone(), value.clone());
        }
    }

    for name in feature_names {
        if !out.contains_key(name) {
            out.insert(name.clone(), number(fill_value_for(name)));
        }
    }

    out
}

/// Null fields with a numeric-sounding name take the numeric policy even
/// when they are not in the expected feature list.
fn looks_numeric(name: &str) -> bool {
    name.ends_with("_percentage")
        || name.ends_with("_rate")
        || name.starts_with("minutes")
        || is_physical(name)
}

fn number(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Impute a tabulated batch: numeric columns are filled per the policy (with
/// the columnwise median for physical attributes), string columns are filled
/// with the sentinel, and expected features with no column at all are added
/// as constant columns.
pub fn impute_frame(df: &DataFrame, feature_names: &[String]) -> Result<DataFrame> {
    let mut result = df.clone();
    let height = df.height();

    for column in df.get_columns() {
        let name = column.name().to_string();
        let series = column.as_materialized_series();

        let filled = match series.dtype() {
            DataType::String => {
                let ca = series.str().map_err(polars::error::PolarsError::from)?;
                let filled: StringChunked = ca
                    .into_iter()
                    .map(|opt| Some(opt.unwrap_or(UNKNOWN_CATEGORY).to_string()))
                    .collect();
                filled.with_name(series.name().clone()).into_series()
            }
            _ => {
                let casted = series
                    .cast(&DataType::Float64)
                    .map_err(polars::error::PolarsError::from)?;
                let ca = casted.f64().map_err(polars::error::PolarsError::from)?;

                let fill = if is_physical(&name) {
                    // Batch median when any values exist, fixed fallback otherwise
                    ca.median().unwrap_or_else(|| fill_value_for(&name))
                } else {
                    fill_value_for(&name)
                };

                let filled: Float64Chunked = ca
                    .into_iter()
                    .map(|opt| Some(opt.unwrap_or(fill)))
                    .collect();
                filled.with_name(series.name().clone()).into_series()
            }
        };

        result = result.with_column(filled)?.clone();
    }

    for name in feature_names {
        if result.column(name).is_err() {
            let constant = fill_value_for(name);
            let values = vec![constant; height];
            let series = Series::new(name.as_str().into(), &values);
            result = result.with_column(series)?.clone();
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_fill_values_by_pattern() {
        assert_eq!(fill_value_for("three_point_percentage"), 0.0);
        assert_eq!(fill_value_for("usage_rate"), 0.0);
        assert_eq!(fill_value_for("minutes_last_7_days"), 0.0);
        assert_eq!(fill_value_for("age"), 25.0);
        assert_eq!(fill_value_for("rebounds"), 0.0);
    }

    #[test]
    fn test_record_missing_expected_features_filled() {
        let rec = record(json!({"points": 20.0}));
        let imputed = impute_record(&rec, &names(&["points", "age", "usage_rate"]));

        assert_eq!(imputed["age"].as_f64().unwrap(), 25.0);
        assert_eq!(imputed["usage_rate"].as_f64().unwrap(), 0.0);
        assert_eq!(imputed["points"].as_f64().unwrap(), 20.0);
    }

    #[test]
    fn test_record_null_categorical_becomes_unknown() {
        let rec = record(json!({"position": null, "points": 5.0}));
        let imputed = impute_record(&rec, &names(&["points"]));
        assert_eq!(imputed["position"].as_str().unwrap(), UNKNOWN_CATEGORY);
    }

    #[test]
    fn test_record_imputation_is_deterministic() {
        let rec = record(json!({"points": 12.0, "age": null}));
        let features = names(&["points", "age"]);
        let a = impute_record(&rec, &features);
        let b = impute_record(&rec, &features);
        assert_eq!(a, b);
    }

    #[test]
    fn test_frame_physical_uses_batch_median() {
        let records: Vec<Record> = vec![
            record(json!({"age": 22.0, "points": 10.0})),
            record(json!({"points": 8.0})),
            record(json!({"age": 30.0, "points": 12.0})),
        ];
        let tab = crate::data::tabulate(&records).unwrap();
        let imputed = impute_frame(&tab.frame, &names(&["age", "points"])).unwrap();

        let age = imputed.column("age").unwrap().f64().unwrap();
        // Median of [22, 30] = 26
        assert!((age.get(1).unwrap() - 26.0).abs() < 1e-9);
    }

    #[test]
    fn test_frame_adds_missing_expected_columns() {
        let records: Vec<Record> = vec![record(json!({"points": 10.0}))];
        let tab = crate::data::tabulate(&records).unwrap();
        let imputed = impute_frame(&tab.frame, &names(&["points", "usage_rate", "age"])).unwrap();

        let usage = imputed.column("usage_rate").unwrap().f64().unwrap();
        assert_eq!(usage.get(0).unwrap(), 0.0);
        let age = imputed.column("age").unwrap().f64().unwrap();
        assert_eq!(age.get(0).unwrap(), 25.0);
    }

    #[test]
    fn test_frame_string_nulls_become_unknown() {
        let records: Vec<Record> = vec![
            record(json!({"position": "Guard", "points": 10.0})),
            record(json!({"points": 8.0})),
        ];
        let tab = crate::data::tabulate(&records).unwrap();
        let imputed = impute_frame(&tab.frame, &[]).unwrap();

        let position = imputed.column("position").unwrap().str().unwrap();
        assert_eq!(position.get(1).unwrap(), UNKNOWN_CATEGORY);
    }
}
