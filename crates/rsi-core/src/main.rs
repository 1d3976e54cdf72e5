use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rsi_core::{Config, ModelGateway, OpenAiChat, Sequencer};

const KEY_FILE: &str = "apikey.json";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "rsi_core=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("RSI suite starting up...");

    dotenvy::dotenv().ok();
    let config = if Path::new(KEY_FILE).exists() {
        info!("Using credentials from {}", KEY_FILE);
        Config::from_key_file(KEY_FILE)?
    } else {
        Config::from_env()?
    };

    info!("Configuration loaded");
    info!("  API: {}", config.api_url);
    info!("  Model: {} (temperature {})", config.model, config.temperature);
    info!(
        "  Fan-out: {} challenges, top {}, {} evaluation functions, {} solutions",
        config.pipeline.challenges,
        config.pipeline.top_challenges,
        config.pipeline.evaluation_functions,
        config.pipeline.solutions
    );

    let model = OpenAiChat::from_config(&config).context("Failed to build chat client")?;
    let gateway = Arc::new(ModelGateway::new(Arc::new(model), config.retry.clone()));
    let sequencer = Sequencer::new(gateway, config.pipeline.clone());

    let report = match sequencer.run_iteration().await {
        Ok(report) => report,
        Err(e) => {
            error!("Iteration could not start: {}", e);
            return Err(e).context("Iteration failed");
        }
    };

    info!(
        "Iteration {} finished: {} completed, {} failed",
        report.iteration_id,
        report.completed().count(),
        report.failures().count()
    );
    for failure in report.failures() {
        info!(
            "  {} failed during {} ({})",
            failure.challenge_id, failure.state, failure.kind
        );
    }

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    info!("Report:\n{}", json);

    Ok(())
}
