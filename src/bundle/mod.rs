//! Persisted model bundles
//!
//! A bundle is the unit of deployment: a trained model plus its companion
//! scaler and expected feature list, tagged with the domain model type and
//! algorithm name. Bundles are loaded once at process start, shared
//! read-only, and never mutated.
//!
//! Two persisted shapes are tolerated: a bare model blob, or a full mapping
//! with `model` / `scaler` / `feature_names` / tags (missing keys default to
//! empty). Whether the model is a classifier — and whether it exposes
//! ensemble members — is resolved once here, never re-probed per call.

use crate::error::{FastbreakError, Result};
use crate::model::TrainedModel;
use crate::pipeline::Scaler;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Domain model type tag. Drives feature engineering and output enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    PlayerPerformance,
    InjuryRisk,
    GameOutcome,
    Unknown,
}

impl ModelKind {
    /// Parse a CLI/blob tag. Unrecognized tags map to `Unknown`, which
    /// yields empty domain output rather than an error.
    pub fn parse(tag: &str) -> Self {
        match tag {
            "player_performance" => ModelKind::PlayerPerformance,
            "injury_risk" => ModelKind::InjuryRisk,
            "game_outcome" => ModelKind::GameOutcome,
            _ => ModelKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::PlayerPerformance => "player_performance",
            ModelKind::InjuryRisk => "injury_risk",
            ModelKind::GameOutcome => "game_outcome",
            ModelKind::Unknown => "unknown",
        }
    }
}

/// What the loaded model can do, resolved once at load time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictorCapability {
    /// Exposes predict_proba; predictions are argmax class labels
    Classifier,
    /// Point predictions; ensemble members enable disagreement confidence
    Regressor { has_ensemble: bool },
}

/// Persisted blob shapes. `Full` is what the trainer writes; `Bare` covers
/// legacy blobs that are just a serialized model.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum BundleBlob {
    Full {
        model: TrainedModel,
        #[serde(default)]
        scaler: Option<Scaler>,
        #[serde(default)]
        feature_names: Vec<String>,
        #[serde(default)]
        model_type: Option<ModelKind>,
        #[serde(default)]
        algorithm_name: Option<String>,
    },
    Bare(TrainedModel),
}

/// A loaded model plus its companion scaler and expected feature list.
/// Immutable after construction.
#[derive(Debug, Clone)]
pub struct ModelBundle {
    pub model: TrainedModel,
    pub scaler: Option<Scaler>,
    /// Expected feature names, in order. Empty for legacy bundles, in which
    /// case all numeric record fields pass through in original order.
    pub feature_names: Vec<String>,
    pub model_type: ModelKind,
    pub algorithm_name: String,
    capability: PredictorCapability,
}

impl ModelBundle {
    pub fn new(
        model: TrainedModel,
        scaler: Option<Scaler>,
        feature_names: Vec<String>,
        model_type: ModelKind,
        algorithm_name: impl Into<String>,
    ) -> Self {
        let capability = resolve_capability(&model);
        Self {
            model,
            scaler,
            feature_names,
            model_type,
            algorithm_name: algorithm_name.into(),
            capability,
        }
    }

    pub fn capability(&self) -> PredictorCapability {
        self.capability
    }

    /// Load a bundle from a persisted JSON blob. The CLI tags override
    /// whatever the blob carries, matching the command-line contract where
    /// model type and algorithm are always passed explicitly.
    pub fn load(
        path: &Path,
        model_type_override: Option<ModelKind>,
        algorithm_override: Option<&str>,
    ) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| FastbreakError::BundleLoad(format!("{}: {}", path.display(), e)))?;
        let blob: BundleBlob = serde_json::from_str(&raw)
            .map_err(|e| FastbreakError::BundleLoad(format!("{}: {}", path.display(), e)))?;

        let (model, scaler, feature_names, blob_kind, blob_algo) = match blob {
            BundleBlob::Full {
                model,
                scaler,
                feature_names,
                model_type,
                algorithm_name,
            } => (model, scaler, feature_names, model_type, algorithm_name),
            BundleBlob::Bare(model) => (model, None, Vec::new(), None, None),
        };

        let model_type = model_type_override
            .or(blob_kind)
            .unwrap_or(ModelKind::Unknown);
        let algorithm_name = algorithm_override
            .map(|s| s.to_string())
            .or(blob_algo)
            .unwrap_or_else(|| model.algorithm_name().to_string());

        Ok(Self::new(model, scaler, feature_names, model_type, algorithm_name))
    }

    /// Persist as a full JSON blob
    pub fn save(&self, path: &Path) -> Result<()> {
        let blob = BundleBlob::Full {
            model: self.model.clone(),
            scaler: self.scaler.clone(),
            feature_names: self.feature_names.clone(),
            model_type: Some(self.model_type),
            algorithm_name: Some(self.algorithm_name.clone()),
        };
        let json = serde_json::to_string_pretty(&blob)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn resolve_capability(model: &TrainedModel) -> PredictorCapability {
    if model.is_classifier() {
        PredictorCapability::Classifier
    } else {
        PredictorCapability::Regressor {
            has_ensemble: matches!(model, TrainedModel::RandomForestRegressor(_)),
        }
    }
}
