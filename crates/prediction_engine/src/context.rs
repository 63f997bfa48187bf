//! Feature normalizer: loosely keyed input record → fully populated [`MatchContext`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_RUNS_REQUIRED: f64 = 150.0;
pub const DEFAULT_BALLS_REMAINING: f64 = 120.0;
pub const DEFAULT_WICKETS_IN_HAND: f64 = 10.0;
pub const DEFAULT_TARGET_MATCH: f64 = 250.0;
pub const DEFAULT_CURRENT_RUN_RATE: f64 = 6.0;
pub const DEFAULT_REQUIRED_RUN_RATE: f64 = 7.5;
pub const DEFAULT_TOSS_DECISION: &str = "bat";

/// Categorical columns a [`MatchContext`] can supply, by schema name.
pub const CATEGORICAL_COLUMNS: [&str; 5] =
    ["batting_team", "bowling_team", "venue", "toss_winner", "toss_decision"];
/// Numerical columns a [`MatchContext`] can supply, by schema name.
pub const NUMERIC_COLUMNS: [&str; 6] = [
    "runs_required",
    "balls_remaining",
    "wickets_in_hand",
    "target_match",
    "current_run_rate",
    "required_run_rate",
];

const DEFAULT_BATTING_TEAM: &str = "Team 1";
const DEFAULT_BOWLING_TEAM: &str = "Team 2";
const DEFAULT_VENUE: &str = "Unknown";

/// The normalized feature record the model is evaluated on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchContext {
    pub batting_team: String,
    pub bowling_team: String,
    pub venue: String,
    pub toss_winner: String,
    pub toss_decision: String,

    pub runs_required: f64,
    pub balls_remaining: f64,
    pub wickets_in_hand: f64,
    pub target_match: f64,
    pub current_run_rate: f64,
    pub required_run_rate: f64,
}

impl MatchContext {
    /// Categorical column by schema name.
    pub fn categorical(&self, name: &str) -> Option<&str> {
        match name {
            "batting_team" => Some(&self.batting_team),
            "bowling_team" => Some(&self.bowling_team),
            "venue" => Some(&self.venue),
            "toss_winner" => Some(&self.toss_winner),
            "toss_decision" => Some(&self.toss_decision),
            _ => None,
        }
    }

    /// Numerical column by schema name.
    pub fn numeric(&self, name: &str) -> Option<f64> {
        match name {
            "runs_required" => Some(self.runs_required),
            "balls_remaining" => Some(self.balls_remaining),
            "wickets_in_hand" => Some(self.wickets_in_hand),
            "target_match" => Some(self.target_match),
            "current_run_rate" => Some(self.current_run_rate),
            "required_run_rate" => Some(self.required_run_rate),
            _ => None,
        }
    }
}

/// Builds a [`MatchContext`] from an arbitrary record.
///
/// Each field resolves canonical key → alias key → default. Nothing is
/// rejected: `null`, blank strings, non-finite or unparsable numbers count
/// as missing.
pub fn normalize(record: &Map<String, Value>) -> MatchContext {
    let batting_team = text(record, &["batting_team", "team1"])
        .unwrap_or_else(|| DEFAULT_BATTING_TEAM.to_string());
    let bowling_team = text(record, &["bowling_team", "team2"])
        .unwrap_or_else(|| DEFAULT_BOWLING_TEAM.to_string());
    let venue = text(record, &["venue"]).unwrap_or_else(|| DEFAULT_VENUE.to_string());
    let toss_winner = text(record, &["toss_winner"]).unwrap_or_else(|| batting_team.clone());
    let toss_decision =
        text(record, &["toss_decision"]).unwrap_or_else(|| DEFAULT_TOSS_DECISION.to_string());

    MatchContext {
        batting_team,
        bowling_team,
        venue,
        toss_winner,
        toss_decision,
        runs_required: number(record, "runs_required").unwrap_or(DEFAULT_RUNS_REQUIRED),
        balls_remaining: number(record, "balls_remaining").unwrap_or(DEFAULT_BALLS_REMAINING),
        wickets_in_hand: number(record, "wickets_in_hand").unwrap_or(DEFAULT_WICKETS_IN_HAND),
        target_match: number(record, "target_match").unwrap_or(DEFAULT_TARGET_MATCH),
        current_run_rate: number(record, "current_run_rate").unwrap_or(DEFAULT_CURRENT_RUN_RATE),
        required_run_rate: number(record, "required_run_rate")
            .unwrap_or(DEFAULT_REQUIRED_RUN_RATE),
    }
}

fn text(record: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match record.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn number(record: &Map<String, Value>, key: &str) -> Option<f64> {
    let v = match record.get(key)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}
