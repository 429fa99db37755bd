//! Input records and tabulation
//!
//! A [`Record`] is one prediction subject's raw named attributes: an ordered
//! mapping of scalar values (numeric, boolean, string, or null). Unknown keys
//! are permitted and missing keys are valid. The vectorized batch path
//! tabulates a slice of records into a polars DataFrame; records that cannot
//! be tabulated (non-scalar values) are marked invalid up front.

use crate::error::{FastbreakError, Result};
use polars::prelude::*;
use serde_json::Value;

/// One input entity's raw named attributes. Ordered so that legacy bundles
/// without a feature list see columns in their original order.
pub type Record = serde_json::Map<String, Value>;

/// Maximum length of the input preview embedded in error results.
const PREVIEW_MAX_CHARS: usize = 200;

/// Coerce a scalar JSON value to f64. Booleans map to 0/1 and numeric
/// strings are parsed, matching what the bulk table path does column-wise.
pub fn coerce_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// A value is scalar when it can live in a single table cell.
pub fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// A record is tabulatable when every value is scalar.
pub fn is_tabulatable(record: &Record) -> bool {
    record.values().all(is_scalar)
}

/// Truncated string preview of a record, for error results.
pub fn input_preview(record: &Record) -> String {
    let rendered = serde_json::to_string(record).unwrap_or_else(|_| "<unprintable>".to_string());
    if rendered.chars().count() > PREVIEW_MAX_CHARS {
        let truncated: String = rendered.chars().take(PREVIEW_MAX_CHARS).collect();
        format!("{}...", truncated)
    } else {
        rendered
    }
}

/// Parse batch input: either `{"batch_data": [...]}` or a bare list of records.
pub fn parse_batch_input(value: Value) -> Result<Vec<Record>> {
    let list = match value {
        Value::Object(mut map) => match map.remove("batch_data") {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(FastbreakError::InvalidInput(
                    "batch_data must be a list of records".to_string(),
                ))
            }
            None => {
                return Err(FastbreakError::InvalidInput(
                    "input must contain 'batch_data' as a list or be a list itself".to_string(),
                ))
            }
        },
        Value::Array(items) => items,
        _ => {
            return Err(FastbreakError::InvalidInput(
                "input must contain 'batch_data' as a list or be a list itself".to_string(),
            ))
        }
    };

    list.into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            other => Err(FastbreakError::InvalidInput(format!(
                "batch entry is not an object: {}",
                other
            ))),
        })
        .collect()
}

/// Parse a single-prediction input document (one JSON object).
pub fn parse_single_input(value: Value) -> Result<Record> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(FastbreakError::InvalidInput(format!(
            "input is not a JSON object: {}",
            other
        ))),
    }
}

/// Result of tabulating a batch for the vectorized path.
#[derive(Debug)]
pub struct Tabulated {
    /// One row per valid record, columns in first-seen key order.
    pub frame: DataFrame,
    /// Original batch indices of the rows in `frame`, in row order.
    pub valid_indices: Vec<usize>,
    /// Original batch indices of records excluded from the bulk path.
    pub invalid_indices: Vec<usize>,
}

/// Tabulate records into a DataFrame over the union of their keys.
///
/// A column is numeric only if every present value coerces with
/// [`coerce_numeric`]; otherwise it is kept as a string column. Absent keys
/// become nulls, to be filled by the imputation policy downstream.
pub fn tabulate(records: &[Record]) -> Result<Tabulated> {
    let mut valid_indices = Vec::new();
    let mut invalid_indices = Vec::new();

    for (i, record) in records.iter().enumerate() {
        if is_tabulatable(record) {
            valid_indices.push(i);
        } else {
            invalid_indices.push(i);
        }
    }

    // Union of keys in first-seen order across valid records.
    let mut column_names: Vec<String> = Vec::new();
    for &i in &valid_indices {
        for key in records[i].keys() {
            if !column_names.iter().any(|c| c == key) {
                column_names.push(key.clone());
            }
        }
    }

    let mut columns: Vec<Column> = Vec::with_capacity(column_names.len());
    for name in &column_names {
        let cells: Vec<Option<&Value>> = valid_indices
            .iter()
            .map(|&i| records[i].get(name).filter(|v| !v.is_null()))
            .collect();

        let all_numeric = cells
            .iter()
            .flatten()
            .all(|v| coerce_numeric(v).is_some());

        let column = if all_numeric {
            let ca: Float64Chunked = cells
                .iter()
                .map(|cell| cell.and_then(|v| coerce_numeric(v)))
                .collect();
            ca.with_name(name.as_str().into()).into_series().into()
        } else {
            let ca: StringChunked = cells
                .iter()
                .map(|cell| cell.map(render_cell))
                .collect();
            ca.with_name(name.as_str().into()).into_series().into()
        };
        columns.push(column);
    }

    let frame = if columns.is_empty() {
        DataFrame::empty()
    } else {
        DataFrame::new(columns).map_err(|e| FastbreakError::DataError(e.to_string()))?
    };

    Ok(Tabulated {
        frame,
        valid_indices,
        invalid_indices,
    })
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
