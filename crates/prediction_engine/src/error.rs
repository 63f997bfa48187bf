use std::path::PathBuf;

use thiserror::Error;

/// Failures of the inference side: loading, validating and evaluating the artifact.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid model artifact: {0}")]
    InvalidArtifact(String),

    #[error("column {0:?} is not part of the match schema")]
    UnknownColumn(String),

    #[error("feature vector has {got} entries, forest expects {expected}")]
    FeatureMismatch { got: usize, expected: usize },
}

/// Why an explanation stage gave up. Always recovered inside the chain.
#[derive(Debug, Error)]
pub enum ExplainError {
    #[error("no model artifact loaded")]
    ModelUnavailable,

    #[error("exact attribution disabled")]
    Disabled,

    #[error("attribution failed: {0}")]
    Attribution(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Failure surfaced to the request boundary. Carries detail for the operator log only.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("inference failed: {0}")]
    Inference(#[from] EngineError),
}
