/// Cricket Insight: prediction API
///
/// Co dělá:
///   1. Načte model z CRICKET_MODEL_DIR (nebo až při první predikci, PREDICT_LAZY_MODEL=true)
///   2. Na POST /api/predict vrací vítěze, pravděpodobnost a seřazené faktory
///   3. Bez modelu běží v degraded režimu (0.5, heuristické faktory)
///
/// Spuštění:
///   cargo run --bin cricket-api

use anyhow::{Context, Result};
use cricket_insight::config::Config;
use cricket_insight::http::{handle_connection, AppState};
use dotenv::dotenv;
use logger::EventLogger;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let config = Config::from_env()?;
    info!("=== Win Wise Cricket Insight API ===");
    info!("Model dir: {} (lazy={})", config.model_dir.display(), config.lazy_model);
    info!("Exact attribution: {}", config.exact_attribution);
    info!("Logs: {}/", config.log_dir.display());

    let events = Arc::new(EventLogger::new(&config.log_dir));

    // Eager load reads and validates the artifact from disk; keep it off the reactor.
    let service = {
        let config = config.clone();
        let events = Arc::clone(&events);
        tokio::task::spawn_blocking(move || cricket_insight::build_service(&config, &events))
            .await
            .context("model loader task")?
    };
    if !config.lazy_model && !service.model_loaded() {
        warn!("No usable model; serving degraded predictions");
    }

    let state = AppState {
        service: Arc::new(service),
        events,
        cors_origin: config.cors_origin.clone(),
    };

    let listener = TcpListener::bind(config.bind).await.context("http bind")?;
    info!("cricket-api listening on http://{} (GET /, /health; POST /api/predict)", config.bind);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("accept failed: {}", e);
                continue;
            }
        };
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                debug!("http handler err {}: {}", peer, e);
            }
        });
    }
}
