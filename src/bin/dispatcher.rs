//! Job dispatcher process
//!
//! Watches the jobs directory for launch descriptors and runs the queue
//! worker that actually spawns producer/consumer processes.

use candlecast::config;
use candlecast::control::ControlPlane;
use candlecast::dispatch::{DispatchContext, DispatchRuntime, JobWatcher, LaunchProcessJob};
use candlecast::logging;
use apalis_redis::RedisStorage;
use dotenvy::dotenv;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    logging::init_logging("dispatcher");

    let redis_url = config::get_redis_url();
    let conn = apalis_redis::connect(redis_url).await?;
    let storage: RedisStorage<LaunchProcessJob> = RedisStorage::new(conn);

    let control = ControlPlane::connect().await?;
    let context = Arc::new(DispatchContext::new(control));

    let runtime = DispatchRuntime::new(context, storage.clone());
    let worker_handle = runtime.start_worker();

    let watcher = JobWatcher::new(config::get_jobs_dir(), storage);

    tokio::select! {
        result = watcher.run() => result?,
        _ = signal::ctrl_c() => {
            info!("Dispatcher interrupted, shutting down");
            worker_handle.abort();
        }
    }
    Ok(())
}
