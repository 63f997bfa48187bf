//! End-to-end runs against the fixture artifact on disk.

use std::fs;
use std::path::{Path, PathBuf};

use prediction_engine::artifact::{INFO_FILE, MODEL_FILE};
use prediction_engine::explain::static_defaults;
use prediction_engine::{
    ConfidenceTier, Impact, MatchRequest, ModelArtifact, ModelHandle, PredictionService, ServiceOptions,
};
use serde_json::json;

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

fn model_dir(with_info: bool) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::copy(fixtures().join(MODEL_FILE), dir.path().join(MODEL_FILE)).unwrap();
    if with_info {
        fs::copy(fixtures().join(INFO_FILE), dir.path().join(INFO_FILE)).unwrap();
    }
    dir
}

fn india_at_mcg() -> MatchRequest {
    MatchRequest::new("India", "Australia", "MCG").with_toss("India", "bat")
}

#[test]
fn loaded_model_explains_with_tree_shap() {
    let dir = model_dir(true);
    let service = PredictionService::new(ModelHandle::eager(dir.path()), ServiceOptions::default());
    assert!(service.model_loaded());

    let out = service.predict_record(&india_at_mcg().to_record()).unwrap();
    assert_eq!(out.source, "tree_shap");
    assert_eq!(out.winner, "India");
    assert_eq!(out.probability, 0.65);
    assert_eq!(out.confidence, ConfidenceTier::Medium);

    let names: Vec<&str> = out.explanation.iter().map(|f| f.feature.as_str()).collect();
    assert_eq!(
        names,
        ["Runs Required", "Wickets In Hand", "Current Run Rate", "Venue: MCG", "Required Run Rate"]
    );
    assert_eq!(out.explanation[2].impact, Impact::Negative);
}

#[test]
fn shap_values_reconstruct_the_probability() {
    let dir = model_dir(true);
    let artifact = ModelArtifact::load_dir(dir.path()).unwrap().unwrap();
    let ctx = prediction_engine::normalize(&india_at_mcg().to_record());
    let row = artifact.transform(&ctx).unwrap();
    let phi = prediction_engine::tree_shap::shap_values(artifact.forest(), &row).unwrap();
    let p = artifact.predict_proba(&ctx).unwrap()[1];
    assert!((artifact.forest().expected_value() + phi.iter().sum::<f64>() - p).abs() < 1e-9);
}

#[test]
fn missing_sidecar_yields_positional_names() {
    let dir = model_dir(false);
    let service = PredictionService::new(ModelHandle::lazy(dir.path()), ServiceOptions::default());
    assert!(!service.model_loaded());

    let resp = service.predict(&india_at_mcg()).unwrap();
    assert!(service.model_loaded());
    assert_eq!(resp.probability, 0.65);
    assert_eq!(resp.shap_explanation[0].feature, "feature_0");
    assert!(resp.shap_explanation.iter().all(|f| f.feature.starts_with("feature_")));
}

#[test]
fn empty_model_dir_is_degraded_mode() {
    let dir = tempfile::tempdir().unwrap();
    let service = PredictionService::new(ModelHandle::eager(dir.path()), ServiceOptions::default());
    let resp = service.predict(&india_at_mcg()).unwrap();
    assert!(!service.model_loaded());
    assert_eq!(resp.winner, "India");
    assert_eq!(resp.probability, 0.5);
    assert_eq!(resp.confidence, ConfidenceTier::Low);
    assert_eq!(resp.shap_explanation.len(), 5);
}

#[test]
fn unseen_teams_and_venue_still_predict() {
    let dir = model_dir(true);
    let service = PredictionService::new(ModelHandle::eager(dir.path()), ServiceOptions::default());
    let resp = service
        .predict(&MatchRequest::new("Nepal", "Oman", "Kirtipur"))
        .unwrap();
    assert!((0.0..=1.0).contains(&resp.probability));
    assert!(resp.winner == "Nepal" || resp.winner == "Oman");
    assert!(!resp.shap_explanation.is_empty());
}

#[test]
fn record_with_loose_keys_uses_defaults() {
    let service = PredictionService::new(ModelHandle::absent(), ServiceOptions {
        heuristic_jitter: 0.0,
        ..ServiceOptions::default()
    });
    let record = match json!({"runs_required": "300", "wickets_in_hand": null}) {
        serde_json::Value::Object(m) => m,
        _ => unreachable!(),
    };
    let out = service.predict_record(&record).unwrap();
    assert_eq!(out.winner, "Team 1");
    assert_eq!(out.source, "heuristic");
    // -0.30 * 300 / 300 dominates the default state.
    assert_eq!(out.explanation[0].feature, "Runs Required");
    assert!((out.explanation[0].value + 0.30).abs() < 1e-12);
}

#[test]
fn static_defaults_are_the_documented_list() {
    let list = static_defaults();
    let got: Vec<(&str, f64)> = list.iter().map(|a| (a.feature.as_str(), a.value)).collect();
    assert_eq!(
        got,
        [
            ("Runs Required", 0.15),
            ("Wickets In Hand", 0.12),
            ("Required Run Rate", -0.10),
            ("Balls Remaining", 0.08),
            ("Current Run Rate", 0.06),
        ]
    );
}
