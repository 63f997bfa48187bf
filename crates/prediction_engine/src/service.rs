//! Prediction orchestrator: normalizer → inference → explanation chain.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::api::{ConfidenceTier, MatchRequest, PredictionResponse};
use crate::artifact::ModelArtifact;
use crate::context::{normalize, MatchContext};
use crate::error::PredictError;
use crate::explain::{static_factors, ExplanationChain, Factor};

/// Probability reported when there is no model to ask.
pub const DEGRADED_PROBABILITY: f64 = 0.5;

/// Single-flight, load-once access to the model artifact.
///
/// A failed or missing load is remembered as `None`; the process stays in
/// degraded mode until restart.
pub struct ModelHandle {
    dir: Option<PathBuf>,
    cell: OnceCell<Option<Arc<ModelArtifact>>>,
}

impl ModelHandle {
    /// Defers loading `dir` until the first prediction.
    pub fn lazy(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            cell: OnceCell::new(),
        }
    }

    /// Loads `dir` right away.
    pub fn eager(dir: impl Into<PathBuf>) -> Self {
        let handle = Self::lazy(dir);
        handle.get();
        handle
    }

    pub fn from_artifact(artifact: ModelArtifact) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(Some(Arc::new(artifact)));
        Self { dir: None, cell }
    }

    /// Permanently degraded handle.
    pub fn absent() -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(None);
        Self { dir: None, cell }
    }

    pub fn get(&self) -> Option<Arc<ModelArtifact>> {
        self.cell
            .get_or_init(|| self.dir.as_deref().and_then(load))
            .clone()
    }

    /// `true` once a model has been loaded. Never triggers a load.
    pub fn is_loaded(&self) -> bool {
        matches!(self.cell.get(), Some(Some(_)))
    }
}

fn load(dir: &Path) -> Option<Arc<ModelArtifact>> {
    match ModelArtifact::load_dir(dir) {
        Ok(Some(artifact)) => {
            info!("ML model loaded from {}", dir.display());
            Some(Arc::new(artifact))
        }
        Ok(None) => {
            warn!("No model in {}; serving degraded predictions", dir.display());
            None
        }
        Err(e) => {
            error!(error = %e, "Error loading model; serving degraded predictions");
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceOptions {
    /// Try Tree SHAP before falling back to global importance.
    pub exact_attribution: bool,
    /// Relative jitter of the degraded-mode heuristic, clamped to `[0, 0.5]`.
    pub heuristic_jitter: f64,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            exact_attribution: true,
            heuristic_jitter: 0.1,
        }
    }
}

/// Outcome of one prediction before it is shaped for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub winner: String,
    /// Batting side's win probability, rounded to two decimals.
    pub probability: f64,
    pub confidence: ConfidenceTier,
    pub explanation: Vec<Factor>,
    /// Stage that produced `explanation`.
    pub source: &'static str,
}

pub struct PredictionService {
    model: ModelHandle,
    model_chain: ExplanationChain,
    degraded_chain: ExplanationChain,
}

impl PredictionService {
    pub fn new(model: ModelHandle, options: ServiceOptions) -> Self {
        Self::with_chains(
            model,
            ExplanationChain::for_model(options.exact_attribution),
            ExplanationChain::degraded(options.heuristic_jitter),
        )
    }

    /// Custom explanation stages for the loaded and the degraded case.
    pub fn with_chains(model: ModelHandle, model_chain: ExplanationChain, degraded_chain: ExplanationChain) -> Self {
        Self {
            model,
            model_chain,
            degraded_chain,
        }
    }

    pub fn model_loaded(&self) -> bool {
        self.model.is_loaded()
    }

    pub fn predict(&self, request: &MatchRequest) -> Result<PredictionResponse, PredictError> {
        let prediction = self.predict_record(&request.to_record())?;
        Ok(PredictionResponse {
            winner: prediction.winner,
            probability: prediction.probability,
            confidence: prediction.confidence,
            shap_explanation: prediction.explanation,
            factors: request.summary(),
        })
    }

    /// Predicts from a loosely keyed record; missing fields take their defaults.
    pub fn predict_record(&self, record: &Map<String, Value>) -> Result<Prediction, PredictError> {
        let ctx = normalize(record);
        let model = self.model.get();

        let (raw, winner, explanation) = match model.as_deref() {
            Some(artifact) => {
                let inference = artifact.predict(&ctx)?;
                let p = inference.probabilities[1];
                debug!(class = inference.class, p_win = p, "inference done");
                (p, winner_for(&ctx, p), self.model_chain.run(&ctx, Some(artifact)))
            }
            // Nothing to compare against: the batting side is reported at evens.
            None => (
                DEGRADED_PROBABILITY,
                ctx.batting_team.clone(),
                self.degraded_chain.run(&ctx, None),
            ),
        };

        let probability = round2(raw);
        let source = explanation.source;
        let factors = explanation
            .attributions
            .into_iter()
            .map(Factor::try_from)
            .collect::<Result<Vec<_>, _>>();
        let (explanation, source) = match factors {
            Ok(list) => (list, source),
            Err(e) => {
                warn!(stage = source, error = %e, "discarding explanation, using static defaults");
                (static_factors(), "static")
            }
        };

        info!(
            batting = %ctx.batting_team,
            bowling = %ctx.bowling_team,
            winner = %winner,
            probability,
            explanation = source,
            "prediction served"
        );

        Ok(Prediction {
            winner,
            probability,
            confidence: ConfidenceTier::from_probability(probability),
            explanation,
            source,
        })
    }
}

/// Strictly above evens → batting side, otherwise bowling side.
fn winner_for(ctx: &MatchContext, p_batting_wins: f64) -> String {
    if p_batting_wins > 0.5 {
        ctx.batting_team.clone()
    } else {
        ctx.bowling_team.clone()
    }
}

fn round2(p: f64) -> f64 {
    (p * 100.0).round() / 100.0
}
