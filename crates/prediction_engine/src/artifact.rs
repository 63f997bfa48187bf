//! Persisted model artifact: fitted preprocessing + forest, and its sidecar schema.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::{MatchContext, CATEGORICAL_COLUMNS, NUMERIC_COLUMNS};
use crate::error::EngineError;
use crate::forest::RandomForest;
use crate::names::FeatureNames;

pub const MODEL_FILE: &str = "cricket_model.json";
pub const INFO_FILE: &str = "model_info.json";

/// Sidecar metadata written next to the pipeline at training time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub categorical_features: Vec<String>,
    pub numerical_features: Vec<String>,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericColumn {
    pub name: String,
    /// Imputed for non-finite input.
    pub median: f64,
    pub mean: f64,
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalColumn {
    pub name: String,
    /// Fitted vocabulary in encoder order. Unseen values encode as all zeros.
    pub categories: Vec<String>,
}

/// Column transformer: standardized numericals first, then one-hot categoricals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub numerical: Vec<NumericColumn>,
    pub categorical: Vec<CategoricalColumn>,
}

impl Preprocessor {
    pub fn output_width(&self) -> usize {
        self.numerical.len() + self.categorical.iter().map(|c| c.categories.len()).sum::<usize>()
    }

    /// The model's internal representation of `ctx`.
    pub fn transform(&self, ctx: &MatchContext) -> Result<Vec<f64>, EngineError> {
        let mut row = Vec::with_capacity(self.output_width());
        for col in &self.numerical {
            let raw = ctx
                .numeric(&col.name)
                .ok_or_else(|| EngineError::UnknownColumn(col.name.clone()))?;
            let x = if raw.is_finite() { raw } else { col.median };
            row.push((x - col.mean) / col.scale);
        }
        for col in &self.categorical {
            let value = ctx
                .categorical(&col.name)
                .ok_or_else(|| EngineError::UnknownColumn(col.name.clone()))?;
            row.extend(col.categories.iter().map(|c| if c == value { 1.0 } else { 0.0 }));
        }
        Ok(row)
    }

    /// Every column must be one a [`MatchContext`] supplies, so a loaded
    /// artifact can always transform a normalized record.
    fn validate(&self) -> Result<(), EngineError> {
        if let Some(col) = self.numerical.iter().find(|c| !NUMERIC_COLUMNS.contains(&c.name.as_str())) {
            return Err(EngineError::UnknownColumn(col.name.clone()));
        }
        if let Some(col) = self
            .categorical
            .iter()
            .find(|c| !CATEGORICAL_COLUMNS.contains(&c.name.as_str()))
        {
            return Err(EngineError::UnknownColumn(col.name.clone()));
        }
        if let Some(col) = self.numerical.iter().find(|c| !(c.scale.is_finite() && c.scale != 0.0)) {
            return Err(EngineError::InvalidArtifact(format!(
                "numerical column {} has unusable scale {}",
                col.name, col.scale
            )));
        }
        Ok(())
    }
}

/// The fitted pipeline as persisted by training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub preprocessor: Preprocessor,
    pub classifier: RandomForest,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inference {
    /// Arg-max class, 1 = batting side wins.
    pub class: usize,
    pub probabilities: [f64; 2],
}

/// Loaded, validated and immutable for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pipeline: Pipeline,
    info: Option<ModelInfo>,
    names: FeatureNames,
}

impl ModelArtifact {
    pub fn new(pipeline: Pipeline, info: Option<ModelInfo>) -> Result<Self, EngineError> {
        pipeline.preprocessor.validate()?;
        pipeline.classifier.validate()?;
        let width = pipeline.preprocessor.output_width();
        if width != pipeline.classifier.n_features {
            return Err(EngineError::InvalidArtifact(format!(
                "preprocessor emits {width} features, forest expects {}",
                pipeline.classifier.n_features
            )));
        }
        let names = FeatureNames::build(&pipeline.preprocessor, info.as_ref());
        Ok(Self { pipeline, info, names })
    }

    /// Reads `cricket_model.json` and the optional `model_info.json` from `dir`.
    ///
    /// `Ok(None)` means there is no model to load, which is a supported state.
    pub fn load_dir(dir: &Path) -> Result<Option<Self>, EngineError> {
        let model_path = dir.join(MODEL_FILE);
        if !model_path.exists() {
            warn!("Model file not found: {}", model_path.display());
            return Ok(None);
        }
        let pipeline: Pipeline = read_json(&model_path)?;
        debug!("Model loaded from: {}", model_path.display());

        let info_path = dir.join(INFO_FILE);
        let info = if info_path.exists() {
            Some(read_json::<ModelInfo>(&info_path)?)
        } else {
            warn!("Model info not found: {} (feature names will be generic)", info_path.display());
            None
        };

        let artifact = Self::new(pipeline, info)?;
        info!(
            trees = artifact.forest().trees.len(),
            max_depth = artifact.forest().max_depth(),
            features = artifact.forest().n_features,
            "model artifact ready"
        );
        Ok(Some(artifact))
    }

    pub fn forest(&self) -> &RandomForest {
        &self.pipeline.classifier
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.pipeline.preprocessor
    }

    pub fn info(&self) -> Option<&ModelInfo> {
        self.info.as_ref()
    }

    pub fn feature_names(&self) -> &FeatureNames {
        &self.names
    }

    pub fn transform(&self, ctx: &MatchContext) -> Result<Vec<f64>, EngineError> {
        self.pipeline.preprocessor.transform(ctx)
    }

    pub fn predict_proba(&self, ctx: &MatchContext) -> Result<[f64; 2], EngineError> {
        let row = self.transform(ctx)?;
        self.pipeline.classifier.predict_proba(&row)
    }

    pub fn predict(&self, ctx: &MatchContext) -> Result<Inference, EngineError> {
        let probabilities = self.predict_proba(ctx)?;
        let class = usize::from(probabilities[1] > probabilities[0]);
        Ok(Inference { class, probabilities })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, EngineError> {
    let raw = fs::read_to_string(path).map_err(|source| EngineError::Io {
        path: PathBuf::from(path),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| EngineError::Parse {
        path: PathBuf::from(path),
        source,
    })
}
