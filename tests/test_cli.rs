//! Integration tests: CLI round-trips through temp files
//! train → predict → batch-predict → evaluate, plus the error-document
//! contract (the output path always holds parseable JSON).

use fastbreak::cli::{self, Cli, Commands};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_training_csv(dir: &Path) -> PathBuf {
    let mut csv = String::from("minutes,field_goals_attempted,points\n");
    for i in 0..40 {
        let minutes = 10.0 + i as f64;
        let shots = 4.0 + (i % 6) as f64;
        let points = 0.5 * minutes + 1.5 * shots;
        writeln!(csv, "{},{},{}", minutes, shots, points).unwrap();
    }
    let path = dir.join("train.csv");
    std::fs::write(&path, csv).unwrap();
    path
}

fn train_bundle(dir: &Path) -> PathBuf {
    let data = write_training_csv(dir);
    let bundle_path = dir.join("model.json");

    let code = cli::run(Cli {
        command: Commands::Train {
            data,
            target: "points".to_string(),
            algorithm: "linear_regression".to_string(),
            task: "regression".to_string(),
            model_type: "player_performance".to_string(),
            scaler: "standard".to_string(),
            top_features: None,
            tune_trials: None,
            output: bundle_path.clone(),
            report_file: Some(dir.join("report.json")),
        },
    });
    assert_eq!(code, 0);
    bundle_path
}

fn read_json(path: &Path) -> serde_json::Value {
    let raw = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&raw).unwrap()
}

#[test]
fn test_train_writes_bundle_and_report() {
    let dir = TempDir::new().unwrap();
    let bundle_path = train_bundle(dir.path());

    let bundle = read_json(&bundle_path);
    assert!(bundle["model"].is_object());
    assert!(bundle["feature_names"].as_array().unwrap().len() >= 2);
    assert_eq!(bundle["model_type"], "player_performance");

    let report = read_json(&dir.path().join("report.json"));
    assert_eq!(report["algorithm"], "linear_regression");
    assert!(report["regression_metrics"]["r2"].as_f64().unwrap() > 0.9);
}

#[test]
fn test_single_prediction_round_trip() {
    let dir = TempDir::new().unwrap();
    let bundle_path = train_bundle(dir.path());

    let input = dir.path().join("input.json");
    std::fs::write(
        &input,
        r#"{"minutes": 30.0, "field_goals_attempted": 8.0, "position": "Guard"}"#,
    )
    .unwrap();
    let output = dir.path().join("prediction.json");

    let code = cli::run(Cli {
        command: Commands::Predict {
            model_path: bundle_path,
            input_file: input,
            output_file: output.clone(),
            model_type: "player_performance".to_string(),
            algorithm: "linear_regression".to_string(),
        },
    });
    assert_eq!(code, 0);

    let result = read_json(&output);
    let predicted = result["prediction"].as_f64().unwrap();
    assert!((predicted - 27.0).abs() < 1.0, "prediction {}", predicted);
    assert_eq!(result["model_type"], "player_performance");
    assert!(result["performance_metrics"]["predicted_points"].is_number());
    assert!(result["timestamp"].is_string());
}

#[test]
fn test_batch_prediction_round_trip() {
    let dir = TempDir::new().unwrap();
    let bundle_path = train_bundle(dir.path());

    let input = dir.path().join("batch.json");
    std::fs::write(
        &input,
        r#"{"batch_data": [
            {"minutes": 30.0, "field_goals_attempted": 8.0},
            {"minutes": "DNP", "field_goals_attempted": 2.0},
            {"minutes": 18.0, "field_goals_attempted": 5.0}
        ]}"#,
    )
    .unwrap();
    let output = dir.path().join("batch_out.json");

    let code = cli::run(Cli {
        command: Commands::BatchPredict {
            model_path: bundle_path,
            input_file: input,
            output_file: output.clone(),
            model_type: "player_performance".to_string(),
            algorithm: "linear_regression".to_string(),
            optimize: false,
            max_workers: Some(2),
        },
    });
    assert_eq!(code, 0);

    let result = read_json(&output);
    let predictions = result["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 3);
    assert_eq!(predictions[0]["batch_index"], 0);
    assert!(predictions[1]["error"].is_string());
    assert_eq!(predictions[1]["batch_index"], 1);
    assert!(predictions[2]["prediction"].is_number());

    let metadata = &result["batch_metadata"];
    assert_eq!(metadata["total_samples"], 3);
    assert!((metadata["success_rate"].as_f64().unwrap() - 2.0 / 3.0).abs() < 1e-9);
}

#[test]
fn test_batch_prediction_optimized_flag() {
    let dir = TempDir::new().unwrap();
    let bundle_path = train_bundle(dir.path());

    let input = dir.path().join("batch.json");
    std::fs::write(
        &input,
        r#"[{"minutes": 30.0, "field_goals_attempted": 8.0},
           {"minutes": 22.0, "field_goals_attempted": 6.0}]"#,
    )
    .unwrap();
    let output = dir.path().join("batch_out.json");

    let code = cli::run(Cli {
        command: Commands::BatchPredict {
            model_path: bundle_path,
            input_file: input,
            output_file: output.clone(),
            model_type: "player_performance".to_string(),
            algorithm: "linear_regression".to_string(),
            optimize: true,
            max_workers: None,
        },
    });
    assert_eq!(code, 0);

    let result = read_json(&output);
    assert_eq!(result["batch_metadata"]["optimization_used"], true);
    assert_eq!(result["batch_metadata"]["valid_samples"], 2);
}

#[test]
fn test_evaluate_round_trip() {
    let dir = TempDir::new().unwrap();
    let bundle_path = train_bundle(dir.path());
    let data = write_training_csv(dir.path());
    let output = dir.path().join("evaluation.json");

    let code = cli::run(Cli {
        command: Commands::Evaluate {
            model_path: bundle_path,
            data,
            target: "points".to_string(),
            output_file: output.clone(),
        },
    });
    assert_eq!(code, 0);

    let report = read_json(&output);
    assert_eq!(report["task"], "regression");
    assert!(report["regression"]["rmse"].as_f64().unwrap() < 5.0);
    assert!(report["basketball_metrics"]["points_analysis"]["within_5_points_pct"].is_number());
}

#[test]
fn test_missing_bundle_writes_error_document() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.json");
    std::fs::write(&input, r#"{"minutes": 30.0}"#).unwrap();
    let output = dir.path().join("prediction.json");

    let code = cli::run(Cli {
        command: Commands::Predict {
            model_path: dir.path().join("missing_model.json"),
            input_file: input,
            output_file: output.clone(),
            model_type: "player_performance".to_string(),
            algorithm: "random_forest".to_string(),
        },
    });
    assert_eq!(code, 1);

    // Failure still leaves parseable JSON at the output path
    let document = read_json(&output);
    assert!(document["error"].as_str().unwrap().contains("model bundle"));
    assert!(document["timestamp"].is_string());
}

#[test]
fn test_malformed_batch_input_writes_error_document() {
    let dir = TempDir::new().unwrap();
    let bundle_path = train_bundle(dir.path());

    let input = dir.path().join("batch.json");
    std::fs::write(&input, r#"{"rows": 41}"#).unwrap();
    let output = dir.path().join("batch_out.json");

    let code = cli::run(Cli {
        command: Commands::BatchPredict {
            model_path: bundle_path,
            input_file: input,
            output_file: output.clone(),
            model_type: "player_performance".to_string(),
            algorithm: "linear_regression".to_string(),
            optimize: false,
            max_workers: None,
        },
    });
    assert_eq!(code, 1);

    let document = read_json(&output);
    assert!(document["error"].as_str().unwrap().contains("batch_data"));
}
