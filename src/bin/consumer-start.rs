//! Pipeline startup orchestrator
//!
//! Clears stale control state, launches the producer through the dispatcher,
//! waits for it, then launches every configured consumer.

use candlecast::config;
use candlecast::control::ControlPlane;
use candlecast::logging;
use candlecast::orchestrator::Orchestrator;
use dotenvy::dotenv;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    logging::init_logging("consumer-start");

    let symbols = config::get_symbols();
    let models = config::get_models();
    let versions = config::get_versions();
    info!(
        symbols = symbols.len(),
        models = models.len(),
        versions = versions.len(),
        "Starting pipeline: {} symbols x {} models x {} versions",
        symbols.len(),
        models.len(),
        versions.len()
    );

    let control = ControlPlane::connect().await?;
    let orchestrator = Orchestrator::new(control, config::get_jobs_dir());
    orchestrator.startup(&symbols, &models, &versions).await?;

    info!("Pipeline startup complete");
    Ok(())
}
