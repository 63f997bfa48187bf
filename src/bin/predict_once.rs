/// predict-once: jedna predikce bez serveru
///
/// Spuštění:
///   cargo run --bin predict-once -- match.json
///   echo '{"team1":"India","team2":"Australia","venue":"MCG"}' | cargo run --bin predict-once

use anyhow::{Context, Result};
use cricket_insight::config::Config;
use dotenv::dotenv;
use logger::EventLogger;
use prediction_engine::MatchRequest;
use std::io::Read;
use tracing_subscriber::{EnvFilter, fmt};

fn main() -> Result<()> {
    dotenv().ok();

    // stdout carries the JSON answer; logs go to stderr.
    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn"))
        )
        .init();

    let raw = match std::env::args().nth(1) {
        Some(path) if path != "-" => {
            std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?
        }
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            buf
        }
    };
    let request: MatchRequest = serde_json::from_str(&raw).context("parsing match request")?;

    let config = Config::from_env()?;
    let events = EventLogger::new(&config.log_dir);
    let service = cricket_insight::build_service(&config, &events);

    let response = service.predict(&request).context("prediction failed")?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
