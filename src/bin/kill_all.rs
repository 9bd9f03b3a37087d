//! Fleet shutdown
//!
//! Broadcasts DELETE to every live entity, waits (bounded) for
//! acknowledgements, wipes the control plane, and always exits 0 so that
//! calling pipelines never fail on teardown.

use candlecast::config;
use candlecast::control::ControlPlane;
use candlecast::logging;
use candlecast::orchestrator::Orchestrator;
use dotenvy::dotenv;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

async fn run(stop: Arc<AtomicBool>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let control = ControlPlane::connect().await?;
    let orchestrator = Orchestrator::new(control, config::get_jobs_dir());
    orchestrator.shutdown(stop).await
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    logging::init_logging("kill_all");

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
            info!("Signal received, finishing cleanup without further waits");
            stop.store(true, Ordering::Relaxed);
        });
    }

    if let Err(e) = run(stop).await {
        error!(error = %e, "Shutdown finished with errors");
    }
    // Teardown must never fail the caller.
    std::process::exit(0);
}
