//! Request and response shapes shared with the HTTP boundary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::explain::Factor;

fn default_match_type() -> String {
    "ODI".to_string()
}

/// Inbound prediction request. `team1` is treated as the batting side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub team1: String,
    pub team2: String,
    pub venue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toss_winner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toss_decision: Option<String>,
    #[serde(default = "default_match_type")]
    pub match_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runs_required: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balls_remaining: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wickets_in_hand: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_match: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_run_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_run_rate: Option<f64>,
}

impl MatchRequest {
    pub fn new(team1: impl Into<String>, team2: impl Into<String>, venue: impl Into<String>) -> Self {
        Self {
            team1: team1.into(),
            team2: team2.into(),
            venue: venue.into(),
            toss_winner: None,
            toss_decision: None,
            match_type: default_match_type(),
            runs_required: None,
            balls_remaining: None,
            wickets_in_hand: None,
            target_match: None,
            current_run_rate: None,
            required_run_rate: None,
        }
    }

    pub fn with_toss(mut self, winner: impl Into<String>, decision: impl Into<String>) -> Self {
        self.toss_winner = Some(winner.into());
        self.toss_decision = Some(decision.into());
        self
    }

    /// Loose record for the normalizer; absent optionals stay absent.
    pub fn to_record(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// The `factors` summary echoed back to the caller.
    pub fn summary(&self) -> BTreeMap<String, String> {
        let mut factors = BTreeMap::new();
        factors.insert(
            "toss".to_string(),
            self.toss_winner
                .as_ref()
                .map_or_else(|| "N/A".to_string(), |w| format!("Won by {w}")),
        );
        factors.insert(
            "toss_decision".to_string(),
            self.toss_decision.clone().unwrap_or_else(|| "N/A".to_string()),
        );
        factors.insert("venue".to_string(), self.venue.clone());
        factors.insert("match_type".to_string(), self.match_type.clone());
        factors
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    /// `> 0.70` high, `> 0.60` medium, otherwise low.
    pub fn from_probability(p: f64) -> Self {
        if p > 0.70 {
            ConfidenceTier::High
        } else if p > 0.60 {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub winner: String,
    /// Batting side's win probability, two decimals.
    pub probability: f64,
    pub confidence: ConfidenceTier,
    pub shap_explanation: Vec<Factor>,
    pub factors: BTreeMap<String, String>,
}
