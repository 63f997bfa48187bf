//! Prediction engine pro kriketové zápasy.
//!
//! Cricket win prediction from a random-forest artifact, with a ranked
//! explanation of every prediction. Without an artifact the engine keeps
//! answering in degraded mode (evens, heuristic factors).

pub mod api;
pub mod artifact;
pub mod context;
pub mod error;
pub mod explain;
pub mod forest;
pub mod names;
pub mod service;
pub mod tree_shap;

pub use api::{ConfidenceTier, MatchRequest, PredictionResponse};
pub use artifact::{Inference, ModelArtifact, ModelInfo, Pipeline, Preprocessor};
pub use context::{normalize, MatchContext};
pub use error::{EngineError, ExplainError, PredictError};
pub use explain::{
    Attribution, Explainer, ExplanationChain, Factor, HeuristicExplainer, Impact,
    ImportanceExplainer, TreeShapExplainer,
};
pub use forest::RandomForest;
pub use names::FeatureNames;
pub use service::{ModelHandle, Prediction, PredictionService, ServiceOptions};
