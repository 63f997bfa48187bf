/// Cricket Insight: Logger
/// JSONL event stream (one file per UTC day)

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct EventLogger {
    log_dir: PathBuf,
}

impl EventLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let dir = log_dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::warn!("Cannot create log dir {}: {}", dir.display(), e);
        }
        Self { log_dir: dir }
    }

    pub fn dir(&self) -> &Path {
        &self.log_dir
    }

    /// Today's file, `<log_dir>/<YYYY-MM-DD>.jsonl`.
    pub fn current_path(&self) -> PathBuf {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        self.log_dir.join(format!("{date}.jsonl"))
    }

    pub fn log<T: Serialize>(&self, event: &T) -> Result<()> {
        let path  = self.current_path();
        let line  = serde_json::to_string(event)?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        writeln!(f, "{line}")?;
        Ok(())
    }

    /// Like [`EventLogger::log`], but a failed write only ends up in tracing.
    pub fn log_quiet<T: Serialize>(&self, event: &T) {
        if let Err(e) = self.log(event) {
            tracing::warn!("Event log write failed: {:#}", e);
        }
    }
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

// ── Event typy ────────────────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
pub struct ModelStatusEvent {
    pub ts:        String,
    pub event:     &'static str,   // "MODEL_STATUS"
    pub model_dir: String,
    pub loaded:    bool,
    pub lazy:      bool,           // true = load deferred to first prediction
}

impl ModelStatusEvent {
    pub fn new(model_dir: impl Into<String>, loaded: bool, lazy: bool) -> Self {
        Self {
            ts: now_iso(),
            event: "MODEL_STATUS",
            model_dir: model_dir.into(),
            loaded,
            lazy,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct PredictionServedEvent {
    pub ts:          String,
    pub event:       &'static str,   // "PREDICTION_SERVED"
    pub batting:     String,
    pub bowling:     String,
    pub venue:       String,
    pub winner:      String,
    pub probability: f64,            // batting side, 2 decimals
    pub confidence:  String,         // "high" | "medium" | "low"
    pub top_factor:  Option<String>,
    pub model_loaded: bool,
}

#[derive(Serialize, Debug)]
pub struct PredictionFailedEvent {
    pub ts:      String,
    pub event:   &'static str,   // "PREDICTION_FAILED"
    pub batting: String,
    pub bowling: String,
    pub error:   String,
}
