//! Runtime configuration from the environment (`.env` is honored by the binaries).

use anyhow::{bail, Context, Result};
use prediction_engine::ServiceOptions;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind: SocketAddr,
    pub model_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Defer loading the model until the first prediction.
    pub lazy_model: bool,
    pub exact_attribution: bool,
    pub heuristic_jitter: f64,
    /// Value of `Access-Control-Allow-Origin`.
    pub cors_origin: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| {
            get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let bind = var("PREDICT_BIND", "0.0.0.0:8000");
        let bind: SocketAddr = bind.parse().with_context(|| format!("Invalid PREDICT_BIND {bind:?}"))?;

        let jitter = var("PREDICT_HEURISTIC_JITTER", "0.1");
        let heuristic_jitter: f64 = jitter
            .parse()
            .with_context(|| format!("Invalid PREDICT_HEURISTIC_JITTER {jitter:?}"))?;
        if !(0.0..=0.5).contains(&heuristic_jitter) {
            bail!("PREDICT_HEURISTIC_JITTER must be within [0, 0.5], got {heuristic_jitter}");
        }

        Ok(Self {
            bind,
            model_dir: PathBuf::from(var("CRICKET_MODEL_DIR", "models")),
            log_dir: PathBuf::from(var("PREDICT_LOG_DIR", "logs")),
            lazy_model: flag("PREDICT_LAZY_MODEL", &var("PREDICT_LAZY_MODEL", "false"))?,
            exact_attribution: flag(
                "PREDICT_EXACT_ATTRIBUTION",
                &var("PREDICT_EXACT_ATTRIBUTION", "true"),
            )?,
            heuristic_jitter,
            cors_origin: var("PREDICT_CORS_ORIGIN", "*"),
        })
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            exact_attribution: self.exact_attribution,
            heuristic_jitter: self.heuristic_jitter,
        }
    }
}

fn flag(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("Invalid {key} {other:?} (expected true/false)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let c = config(&[]).unwrap();
        assert_eq!(c.bind, "0.0.0.0:8000".parse::<SocketAddr>().unwrap());
        assert_eq!(c.model_dir, PathBuf::from("models"));
        assert_eq!(c.log_dir, PathBuf::from("logs"));
        assert!(!c.lazy_model);
        assert!(c.exact_attribution);
        assert_eq!(c.heuristic_jitter, 0.1);
        assert_eq!(c.cors_origin, "*");
    }

    #[test]
    fn overrides_are_parsed() {
        let c = config(&[
            ("PREDICT_BIND", "127.0.0.1:9000"),
            ("CRICKET_MODEL_DIR", "/srv/models"),
            ("PREDICT_LAZY_MODEL", "yes"),
            ("PREDICT_EXACT_ATTRIBUTION", "0"),
            ("PREDICT_HEURISTIC_JITTER", "0"),
        ])
        .unwrap();
        assert_eq!(c.bind.port(), 9000);
        assert_eq!(c.model_dir, PathBuf::from("/srv/models"));
        assert!(c.lazy_model);
        assert!(!c.service_options().exact_attribution);
        assert_eq!(c.service_options().heuristic_jitter, 0.0);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let c = config(&[("PREDICT_LOG_DIR", "  ")]).unwrap();
        assert_eq!(c.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(config(&[("PREDICT_BIND", "nowhere")]).is_err());
        assert!(config(&[("PREDICT_LAZY_MODEL", "maybe")]).is_err());
        assert!(config(&[("PREDICT_HEURISTIC_JITTER", "0.9")]).is_err());
        assert!(config(&[("PREDICT_HEURISTIC_JITTER", "lots")]).is_err());
    }
}
