//! Explanation engine: ranked factors behind a prediction.
//!
//! Each method is an [`Explainer`] strategy. Strategies never fall back on
//! their own; [`ExplanationChain`] tries them in order and ends with the
//! static defaults, so callers always get a non-empty list.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::artifact::ModelArtifact;
use crate::context::MatchContext;
use crate::error::ExplainError;
use crate::tree_shap;

/// Minimum |value| for a model-derived factor to be reported.
pub const SIGNIFICANCE: f64 = 0.01;
/// Cap for attribution and importance lists.
pub const MAX_MODEL_FACTORS: usize = 10;
/// Cap for heuristic lists.
pub const MAX_HEURISTIC_FACTORS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Positive,
    Negative,
    Neutral,
}

impl Impact {
    pub fn from_sign(value: f64) -> Self {
        if value > 0.0 {
            Impact::Positive
        } else if value < 0.0 {
            Impact::Negative
        } else {
            Impact::Neutral
        }
    }
}

/// Raw factor as produced by a stage, before the orchestrator re-validates it.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribution {
    pub feature: String,
    pub value: f64,
    pub impact: Impact,
}

impl Attribution {
    pub fn signed(feature: impl Into<String>, value: f64) -> Self {
        Self {
            feature: feature.into(),
            value,
            impact: Impact::from_sign(value),
        }
    }
}

/// A validated contributor as exposed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub feature: String,
    pub value: f64,
    pub impact: Impact,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvalidFactor(pub String);

impl fmt::Display for InvalidFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid factor: {}", self.0)
    }
}

impl TryFrom<Attribution> for Factor {
    type Error = InvalidFactor;

    fn try_from(a: Attribution) -> Result<Self, Self::Error> {
        if a.feature.trim().is_empty() {
            return Err(InvalidFactor("empty feature name".to_string()));
        }
        if !a.value.is_finite() {
            return Err(InvalidFactor(format!("{} has non-finite value {}", a.feature, a.value)));
        }
        Ok(Factor {
            feature: a.feature,
            value: a.value,
            impact: a.impact,
        })
    }
}

/// One way of explaining a prediction.
pub trait Explainer: Send + Sync {
    fn name(&self) -> &'static str;

    fn explain(
        &self,
        ctx: &MatchContext,
        model: Option<&ModelArtifact>,
    ) -> Result<Vec<Attribution>, ExplainError>;
}

/// Sort by descending |value| and truncate.
pub fn rank(mut list: Vec<Attribution>, cap: usize) -> Vec<Attribution> {
    list.sort_by(|a, b| b.value.abs().total_cmp(&a.value.abs()));
    list.truncate(cap);
    list
}

// ── Exact attribution ──────────────────────────────────────────────────────

/// Tree SHAP values of the "batting side wins" class.
#[derive(Debug, Clone, Copy)]
pub struct TreeShapExplainer {
    enabled: bool,
}

impl TreeShapExplainer {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Default for TreeShapExplainer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Explainer for TreeShapExplainer {
    fn name(&self) -> &'static str {
        "tree_shap"
    }

    fn explain(
        &self,
        ctx: &MatchContext,
        model: Option<&ModelArtifact>,
    ) -> Result<Vec<Attribution>, ExplainError> {
        if !self.enabled {
            return Err(ExplainError::Disabled);
        }
        let model = model.ok_or(ExplainError::ModelUnavailable)?;
        let row = model.transform(ctx)?;
        let phi = tree_shap::shap_values(model.forest(), &row)?;
        if let Some(bad) = phi.iter().position(|v| !v.is_finite()) {
            return Err(ExplainError::Attribution(format!("non-finite value for feature {bad}")));
        }

        let names = model.feature_names();
        let list = phi
            .iter()
            .enumerate()
            .filter(|(_, v)| v.abs() > SIGNIFICANCE)
            .map(|(i, v)| Attribution::signed(names.display(i), *v))
            .collect();
        Ok(rank(list, MAX_MODEL_FACTORS))
    }
}

// ── Global importance ──────────────────────────────────────────────────────

/// Static forest importances used as unsigned pseudo attribution.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportanceExplainer;

impl Explainer for ImportanceExplainer {
    fn name(&self) -> &'static str {
        "feature_importance"
    }

    fn explain(
        &self,
        _ctx: &MatchContext,
        model: Option<&ModelArtifact>,
    ) -> Result<Vec<Attribution>, ExplainError> {
        let model = model.ok_or(ExplainError::ModelUnavailable)?;
        let names = model.feature_names();
        let list = model
            .forest()
            .feature_importances()
            .into_iter()
            .enumerate()
            .filter(|(_, v)| *v > SIGNIFICANCE)
            .map(|(i, v)| Attribution {
                feature: names.display(i),
                value: v,
                impact: Impact::Positive,
            })
            .collect();
        Ok(rank(list, MAX_MODEL_FACTORS))
    }
}

// ── Degraded mode ──────────────────────────────────────────────────────────

/// Linear rules of thumb over the numeric match state, with a small
/// multiplicative jitter. Used only when no model is loaded.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicExplainer {
    /// Relative jitter bound; the sign of a factor never changes.
    jitter: f64,
}

impl HeuristicExplainer {
    pub fn new(jitter: f64) -> Self {
        Self {
            jitter: jitter.clamp(0.0, 0.5),
        }
    }

    /// Jitter-free values for `ctx`.
    pub fn base_values(ctx: &MatchContext) -> [(&'static str, f64); 5] {
        [
            ("Runs Required", -0.30 * ctx.runs_required / 300.0),
            ("Wickets In Hand", 0.25 * ctx.wickets_in_hand / 10.0),
            ("Required Run Rate", -0.20 * ctx.required_run_rate / 12.0),
            ("Current Run Rate", 0.20 * ctx.current_run_rate / 12.0),
            ("Balls Remaining", 0.15 * ctx.balls_remaining / 300.0),
        ]
    }
}

impl Default for HeuristicExplainer {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl Explainer for HeuristicExplainer {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn explain(
        &self,
        ctx: &MatchContext,
        _model: Option<&ModelArtifact>,
    ) -> Result<Vec<Attribution>, ExplainError> {
        let mut rng = rand::thread_rng();
        let list = Self::base_values(ctx)
            .into_iter()
            .map(|(name, base)| {
                let factor = if self.jitter > 0.0 {
                    1.0 + rng.gen_range(-self.jitter..=self.jitter)
                } else {
                    1.0
                };
                Attribution::signed(name, base * factor)
            })
            .collect();
        Ok(rank(list, MAX_HEURISTIC_FACTORS))
    }
}

/// Last resort when every other stage failed.
pub fn static_defaults() -> Vec<Attribution> {
    vec![
        Attribution::signed("Runs Required", 0.15),
        Attribution::signed("Wickets In Hand", 0.12),
        Attribution::signed("Required Run Rate", -0.10),
        Attribution::signed("Balls Remaining", 0.08),
        Attribution::signed("Current Run Rate", 0.06),
    ]
}

/// [`static_defaults`] as validated factors.
pub fn static_factors() -> Vec<Factor> {
    static_defaults()
        .into_iter()
        .map(|a| Factor {
            feature: a.feature,
            value: a.value,
            impact: a.impact,
        })
        .collect()
}

// ── Chain ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Explanation {
    /// Name of the stage that produced `attributions`, `"static"` for the defaults.
    pub source: &'static str,
    pub attributions: Vec<Attribution>,
}

/// Ordered strategies, first non-empty success wins.
pub struct ExplanationChain {
    stages: Vec<Box<dyn Explainer>>,
}

impl ExplanationChain {
    pub fn new(stages: Vec<Box<dyn Explainer>>) -> Self {
        Self { stages }
    }

    /// Exact attribution (when enabled), then global importance.
    pub fn for_model(exact_attribution: bool) -> Self {
        Self::new(vec![
            Box::new(TreeShapExplainer::new(exact_attribution)),
            Box::new(ImportanceExplainer),
        ])
    }

    pub fn degraded(jitter: f64) -> Self {
        Self::new(vec![Box::new(HeuristicExplainer::new(jitter))])
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn run(&self, ctx: &MatchContext, model: Option<&ModelArtifact>) -> Explanation {
        for stage in &self.stages {
            match stage.explain(ctx, model) {
                Ok(list) if !list.is_empty() => {
                    debug!(stage = stage.name(), factors = list.len(), "explanation ready");
                    return Explanation {
                        source: stage.name(),
                        attributions: list,
                    };
                }
                Ok(_) => debug!(stage = stage.name(), "no significant factors, trying next stage"),
                Err(ExplainError::Disabled) => debug!(stage = stage.name(), "stage disabled"),
                Err(e) => warn!(stage = stage.name(), error = %e, "explanation stage failed"),
            }
        }
        Explanation {
            source: "static",
            attributions: static_defaults(),
        }
    }
}
