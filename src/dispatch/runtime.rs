//! Apalis worker setup for launch jobs

use crate::dispatch::context::DispatchContext;
use crate::dispatch::handlers;
use crate::dispatch::types::LaunchProcessJob;
use apalis::prelude::*;
use apalis_redis::RedisStorage;
use std::sync::Arc;
use tracing::info;

pub struct DispatchRuntime {
    context: Arc<DispatchContext>,
    storage: RedisStorage<LaunchProcessJob>,
}

impl DispatchRuntime {
    pub fn new(context: Arc<DispatchContext>, storage: RedisStorage<LaunchProcessJob>) -> Self {
        Self { context, storage }
    }

    /// Start the launch worker and return its handle for shutdown.
    pub fn start_worker(&self) -> tokio::task::JoinHandle<()> {
        let context = self.context.clone();
        let storage = self.storage.clone();
        tokio::spawn(async move {
            let worker = WorkerBuilder::new("launch-process-worker")
                .data(context)
                .backend(storage)
                .build_fn(handlers::handle_launch);

            info!("DispatchRuntime: LaunchProcessJob worker started");
            worker.run().await;
        })
    }
}
