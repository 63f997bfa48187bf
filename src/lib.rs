//! Shared pieces of the `cricket-api` and `predict-once` binaries.

pub mod config;
pub mod http;

use logger::{EventLogger, ModelStatusEvent};
use prediction_engine::{ModelHandle, PredictionService};
use tracing::info;

/// Builds the service the way `config` asks for and records the model status.
pub fn build_service(config: &config::Config, events: &EventLogger) -> PredictionService {
    let handle = if config.lazy_model {
        info!("Model load deferred until first prediction ({})", config.model_dir.display());
        ModelHandle::lazy(&config.model_dir)
    } else {
        ModelHandle::eager(&config.model_dir)
    };
    let service = PredictionService::new(handle, config.service_options());

    events.log_quiet(&ModelStatusEvent::new(
        config.model_dir.display().to_string(),
        service.model_loaded(),
        config.lazy_model,
    ));
    service
}
