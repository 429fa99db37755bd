//! Domain output enrichment
//!
//! Maps a raw prediction back into basketball terms, keyed by the bundle's
//! model type: estimated stat lines for player performance, risk factors and
//! recommendations for injury risk, win framing for game outcomes. Pure
//! threshold and table logic — no learning, no side effects. Unknown model
//! types yield an empty map.

use crate::bundle::ModelKind;
use crate::data::{coerce_numeric, Record};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

type DomainOutput = Map<String, Value>;

/// Workload thresholds for injury risk factors
const HIGH_AGE: f64 = 30.0;
const HIGH_MINUTES_7D: f64 = 240.0;
const HIGH_GAMES_7D: f64 = 4.0;
const URGENT_INJURY_PROBABILITY: f64 = 0.7;

/// Build the model-type-specific output fields.
pub fn enrich(
    prediction: f64,
    probabilities: Option<&BTreeMap<String, f64>>,
    record: &Record,
    kind: ModelKind,
) -> DomainOutput {
    match kind {
        ModelKind::PlayerPerformance => player_performance_output(prediction, record),
        ModelKind::InjuryRisk => injury_risk_output(prediction, probabilities, record),
        ModelKind::GameOutcome => game_outcome_output(prediction, probabilities),
        ModelKind::Unknown => DomainOutput::new(),
    }
}

fn numeric_field(record: &Record, name: &str, default: f64) -> f64 {
    record
        .get(name)
        .and_then(coerce_numeric)
        .unwrap_or(default)
}

// ---------------------------------------------------------------------------
// Player performance
// ---------------------------------------------------------------------------

fn player_performance_output(prediction: f64, record: &Record) -> DomainOutput {
    let position = record
        .get("position")
        .and_then(|v| v.as_str())
        .unwrap_or("Guard");

    // Rough companion-stat estimates from predicted points and position
    let (assist_factor, assist_floor, rebound_factor, rebound_floor) = match position {
        "Point Guard" | "PG" => (0.3, 1.0, 0.2, 1.0),
        "Shooting Guard" | "SG" => (0.2, 1.0, 0.25, 1.0),
        "Center" | "C" => (0.1, 1.0, 0.5, 2.0),
        _ => (0.25, 1.0, 0.4, 2.0), // forwards
    };

    let mut metrics = DomainOutput::new();
    metrics.insert("predicted_points".to_string(), json!(prediction));
    metrics.insert(
        "predicted_assists".to_string(),
        json!((prediction * assist_factor).max(assist_floor)),
    );
    metrics.insert(
        "predicted_rebounds".to_string(),
        json!((prediction * rebound_factor).max(rebound_floor)),
    );

    let mut out = DomainOutput::new();
    out.insert("performance_metrics".to_string(), Value::Object(metrics));
    out.insert(
        "category".to_string(),
        json!(categorize_performance(prediction)),
    );
    out
}

fn categorize_performance(points: f64) -> &'static str {
    if points >= 25.0 {
        "Excellent"
    } else if points >= 20.0 {
        "Very Good"
    } else if points >= 15.0 {
        "Good"
    } else if points >= 10.0 {
        "Average"
    } else {
        "Below Average"
    }
}

// ---------------------------------------------------------------------------
// Injury risk
// ---------------------------------------------------------------------------

fn injury_risk_output(
    prediction: f64,
    probabilities: Option<&BTreeMap<String, f64>>,
    record: &Record,
) -> DomainOutput {
    // Classifiers report the positive-class probability; regressors report
    // the point prediction, clamped into probability range.
    let injury_probability = probabilities
        .and_then(|m| m.get("1"))
        .copied()
        .unwrap_or(prediction)
        .clamp(0.0, 1.0);

    let age = numeric_field(record, "age", 25.0);
    let minutes_last_7 = numeric_field(record, "minutes_last_7_days", 0.0);
    let games_last_7 = numeric_field(record, "games_last_7_days", 0.0);

    let mut risk_factors = Vec::new();
    let mut recommendations = Vec::new();

    if age > HIGH_AGE {
        risk_factors.push(json!({
            "factor": "Age",
            "value": age,
            "impact": "high",
        }));
        recommendations.push(json!({
            "action": "Increase recovery time",
            "priority": "high",
            "description": "Older players need more recovery between games",
        }));
    }

    if minutes_last_7 > HIGH_MINUTES_7D {
        risk_factors.push(json!({
            "factor": "High minutes load",
            "value": minutes_last_7,
            "impact": "medium",
        }));
        recommendations.push(json!({
            "action": "Monitor playing time",
            "priority": "medium",
            "description": "Consider reducing minutes in next few games",
        }));
    }

    if games_last_7 > HIGH_GAMES_7D {
        risk_factors.push(json!({
            "factor": "High game frequency",
            "value": games_last_7,
            "impact": "medium",
        }));
        recommendations.push(json!({
            "action": "Rest consideration",
            "priority": "medium",
            "description": "Consider rest day or reduced role",
        }));
    }

    if injury_probability > URGENT_INJURY_PROBABILITY {
        recommendations.push(json!({
            "action": "Medical evaluation",
            "priority": "urgent",
            "description": "Schedule immediate medical assessment",
        }));
    }

    let mut out = DomainOutput::new();
    out.insert("injury_probability".to_string(), json!(injury_probability));
    out.insert("risk_factors".to_string(), Value::Array(risk_factors));
    out.insert("recommendations".to_string(), Value::Array(recommendations));
    out.insert(
        "category".to_string(),
        json!(categorize_injury_risk(injury_probability)),
    );
    out
}

fn categorize_injury_risk(probability: f64) -> &'static str {
    if probability >= 0.8 {
        "Very High Risk"
    } else if probability >= 0.6 {
        "High Risk"
    } else if probability >= 0.4 {
        "Medium Risk"
    } else if probability >= 0.2 {
        "Low Risk"
    } else {
        "Very Low Risk"
    }
}

// ---------------------------------------------------------------------------
// Game outcome
// ---------------------------------------------------------------------------

fn game_outcome_output(
    prediction: f64,
    probabilities: Option<&BTreeMap<String, f64>>,
) -> DomainOutput {
    let win_probability = match probabilities {
        Some(m) => m
            .get("1")
            .or_else(|| m.get("Win"))
            .copied()
            .unwrap_or(0.5),
        None => prediction,
    }
    .clamp(0.0, 1.0);

    let margin = (win_probability - 0.5).abs();
    let confidence_level = if margin > 0.3 {
        "High"
    } else if margin > 0.1 {
        "Medium"
    } else {
        "Low"
    };

    let mut out = DomainOutput::new();
    out.insert("win_probability".to_string(), json!(win_probability));
    out.insert(
        "predicted_outcome".to_string(),
        json!(if win_probability > 0.5 { "Win" } else { "Loss" }),
    );
    out.insert("confidence_level".to_string(), json!(confidence_level));
    out.insert(
        "category".to_string(),
        json!(categorize_game_outcome(win_probability)),
    );
    out
}

fn categorize_game_outcome(win_probability: f64) -> &'static str {
    if win_probability >= 0.8 {
        "Strong Favorite"
    } else if win_probability >= 0.65 {
        "Favorite"
    } else if win_probability >= 0.55 {
        "Slight Favorite"
    } else if win_probability >= 0.45 {
        "Even"
    } else if win_probability >= 0.35 {
        "Slight Underdog"
    } else if win_probability >= 0.2 {
        "Underdog"
    } else {
        "Strong Underdog"
    }
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

    #[test]
    fn test_performance_categories() {
        assert_eq!(categorize_performance(28.0), "Excellent");
        assert_eq!(categorize_performance(22.0), "Very Good");
        assert_eq!(categorize_performance(17.0), "Good");
        assert_eq!(categorize_performance(12.0), "Average");
        assert_eq!(categorize_performance(5.0), "Below Average");
    }

    #[test]
    fn test_center_rebound_estimate() {
        let rec = record(json!({"position": "Center"}));
        let out = player_performance_output(20.0, &rec);
        let metrics = out["performance_metrics"].as_object().unwrap();
        assert_eq!(metrics["predicted_rebounds"].as_f64().unwrap(), 10.0);
        assert_eq!(metrics["predicted_assists"].as_f64().unwrap(), 2.0);
    }

    #[test]
    fn test_injury_risk_factors_and_urgent_recommendation() {
        let rec = record(json!({
            "age": 33,
            "minutes_last_7_days": 260,
            "games_last_7_days": 5,
        }));
        let out = injury_risk_output(0.75, None, &rec);

        let factors = out["risk_factors"].as_array().unwrap();
        assert_eq!(factors.len(), 3);

        let recommendations = out["recommendations"].as_array().unwrap();
        assert_eq!(recommendations.len(), 4);
        assert!(recommendations
            .iter()
            .any(|r| r["priority"] == "urgent"));

        assert_eq!(out["category"].as_str().unwrap(), "High Risk");
    }

    #[test]
    fn test_injury_probability_from_classifier() {
        let mut probs = BTreeMap::new();
        probs.insert("0".to_string(), 0.35);
        probs.insert("1".to_string(), 0.65);
        let rec = record(json!({"age": 24}));

        let out = injury_risk_output(1.0, Some(&probs), &rec);
        assert!((out["injury_probability"].as_f64().unwrap() - 0.65).abs() < 1e-12);
    }

    #[test]
    fn test_injury_probability_clamped() {
        let rec = record(json!({}));
        let out = injury_risk_output(1.4, None, &rec);
        assert_eq!(out["injury_probability"].as_f64().unwrap(), 1.0);
    }

    #[test]
    fn test_game_outcome_buckets() {
        assert_eq!(categorize_game_outcome(0.85), "Strong Favorite");
        assert_eq!(categorize_game_outcome(0.7), "Favorite");
        assert_eq!(categorize_game_outcome(0.6), "Slight Favorite");
        assert_eq!(categorize_game_outcome(0.5), "Even");
        assert_eq!(categorize_game_outcome(0.4), "Slight Underdog");
        assert_eq!(categorize_game_outcome(0.25), "Underdog");
        assert_eq!(categorize_game_outcome(0.1), "Strong Underdog");
    }

    #[test]
    fn test_game_outcome_fields() {
        let mut probs = BTreeMap::new();
        probs.insert("0".to_string(), 0.2);
        probs.insert("1".to_string(), 0.8);

        let out = game_outcome_output(1.0, Some(&probs));
        assert_eq!(out["predicted_outcome"].as_str().unwrap(), "Win");
        assert_eq!(out["confidence_level"].as_str().unwrap(), "High");
    }

    #[test]
    fn test_unknown_kind_yields_empty_output() {
        let rec = record(json!({"points": 10}));
        let out = enrich(12.0, None, &rec, ModelKind::Unknown);
        assert!(out.is_empty());
    }
}
