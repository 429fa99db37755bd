//! Basketball feature engineering
//!
//! A fixed table of derived features drives both execution paths: the row
//! path derives fields on a single record, the frame path derives whole
//! columns on a tabulated batch. Keeping one table is what makes the two
//! prediction strategies behaviorally equivalent.
//!
//! Each formula activates only when its inputs are present and numeric;
//! absent inputs silently skip that derived feature. Ratio denominators of
//! zero are replaced by one, so zero attempts yield a ratio of zero instead
//! of a division error.

use crate::bundle::ModelKind;
use crate::data::{coerce_numeric, Record};
use crate::error::Result;
use polars::prelude::*;
use serde_json::Value;

/// Arithmetic shape of a derived feature
#[derive(Debug, Clone, Copy)]
enum Formula {
    /// a / b, with b == 0 treated as 1
    Ratio(&'static str, &'static str),
    /// a + b
    Sum(&'static str, &'static str),
    /// a * b
    Product(&'static str, &'static str),
    /// wins / (wins + losses), with an empty denominator treated as 1
    WinShare(&'static str, &'static str),
}

struct DerivedFeature {
    name: &'static str,
    formula: Formula,
    /// None = applies to every model kind
    only_for: Option<ModelKind>,
}

/// The full derivation table, applied in order.
const DERIVED_FEATURES: &[DerivedFeature] = &[
    DerivedFeature {
        name: "shooting_efficiency",
        formula: Formula::Ratio("points", "field_goals_attempted"),
        only_for: None,
    },
    DerivedFeature {
        name: "assist_to_turnover_ratio",
        formula: Formula::Ratio("assists", "turnovers"),
        only_for: None,
    },
    DerivedFeature {
        name: "points_per_minute",
        formula: Formula::Ratio("points", "minutes"),
        only_for: None,
    },
    DerivedFeature {
        name: "usage_rate",
        formula: Formula::Ratio("field_goals_attempted", "team_field_goals_attempted"),
        only_for: None,
    },
    DerivedFeature {
        name: "defensive_actions",
        formula: Formula::Sum("steals", "blocks"),
        only_for: None,
    },
    // Physical load indicators for injury risk
    DerivedFeature {
        name: "avg_minutes_per_game",
        formula: Formula::Ratio("minutes_last_7_days", "games_last_7_days"),
        only_for: Some(ModelKind::InjuryRisk),
    },
    DerivedFeature {
        name: "age_experience_interaction",
        formula: Formula::Product("age", "experience_years"),
        only_for: Some(ModelKind::InjuryRisk),
    },
    // Game context features
    DerivedFeature {
        name: "home_win_percentage",
        formula: Formula::WinShare("home_wins", "home_losses"),
        only_for: Some(ModelKind::GameOutcome),
    },
    DerivedFeature {
        name: "away_win_percentage",
        formula: Formula::WinShare("away_wins", "away_losses"),
        only_for: Some(ModelKind::GameOutcome),
    },
];

fn apply_formula(formula: Formula, lookup: impl Fn(&str) -> Option<f64>) -> Option<f64> {
    match formula {
        Formula::Ratio(a, b) => {
            let num = lookup(a)?;
            let den = lookup(b)?;
            Some(num / if den == 0.0 { 1.0 } else { den })
        }
        Formula::Sum(a, b) => Some(lookup(a)? + lookup(b)?),
        Formula::Product(a, b) => Some(lookup(a)? * lookup(b)?),
        Formula::WinShare(wins, losses) => {
            let w = lookup(wins)?;
            let l = lookup(losses)?;
            let total = w + l;
            Some(w / if total == 0.0 { 1.0 } else { total })
        }
    }
}

fn active_features(kind: ModelKind) -> impl Iterator<Item = &'static DerivedFeature> {
    DERIVED_FEATURES
        .iter()
        .filter(move |f| f.only_for.map_or(true, |k| k == kind))
}

/// Derive features on a single record. Existing fields are never overwritten.
pub fn engineer_record(record: &Record, kind: ModelKind) -> Record {
    let mut out = record.clone();

    for feature in active_features(kind) {
        if out.contains_key(feature.name) {
            continue;
        }
        let derived = apply_formula(feature.formula, |name| {
            out.get(name).and_then(coerce_numeric)
        });
        if let Some(v) = derived {
            if v.is_finite() {
                if let Some(n) = serde_json::Number::from_f64(v) {
                    out.insert(feature.name.to_string(), Value::Number(n));
                }
            }
        }
    }

    out
}

/// Derive feature columns on a tabulated batch. Rows with a null input get a
/// null derived value, to be filled by the imputation policy downstream.
pub fn engineer_frame(df: &DataFrame, kind: ModelKind) -> Result<DataFrame> {
    let mut result = df.clone();

    for feature in active_features(kind) {
        if result.column(feature.name).is_ok() {
            continue;
        }

        let inputs = formula_inputs(feature.formula);
        let columns: Option<Vec<Float64Chunked>> = inputs
            .iter()
            .map(|name| numeric_column(&result, name))
            .collect();

        let Some(columns) = columns else {
            continue; // an input is absent or non-numeric: skip this feature
        };

        let n = result.height();
        let derived: Float64Chunked = (0..n)
            .map(|i| {
                apply_formula(feature.formula, |name| {
                    let idx = inputs.iter().position(|&c| c == name)?;
                    columns[idx].get(i)
                })
            })
            .collect();

        result = result
            .with_column(derived.with_name(feature.name.into()).into_series())?
            .clone();
    }

    Ok(result)
}

/// Names of derived features whose formula reads the given field. The
/// trainer uses this to keep target-derived features out of the feature set.
pub fn derived_consuming(field: &str, kind: ModelKind) -> Vec<&'static str> {
    active_features(kind)
        .filter(|f| formula_inputs(f.formula).contains(&field))
        .map(|f| f.name)
        .collect()
}

fn formula_inputs(formula: Formula) -> Vec<&'static str> {
    match formula {
        Formula::Ratio(a, b)
        | Formula::Sum(a, b)
        | Formula::Product(a, b)
        | Formula::WinShare(a, b) => vec![a, b],
    }
}

fn numeric_column(df: &DataFrame, name: &str) -> Option<Float64Chunked> {
    let column = df.column(name).ok()?;
    let casted = column.cast(&DataType::Float64).ok()?;
    casted.f64().ok().map(|ca| ca.clone())
}
