//! Jobs-directory watcher
//!
//! Polls the jobs directory once a second, turns each descriptor file into a
//! typed launch job on the queue, then deletes the file. Files already in
//! the directory at startup are drained on the first pass. Pickup is
//! at-most-once: the file is gone once the job is queued, even if the later
//! spawn fails.

use crate::dispatch::types::LaunchProcessJob;
use crate::models::JobDescriptor;
use apalis::prelude::*;
use apalis_redis::RedisStorage;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct JobWatcher {
    jobs_dir: PathBuf,
    storage: RedisStorage<LaunchProcessJob>,
}

impl JobWatcher {
    pub fn new(jobs_dir: PathBuf, storage: RedisStorage<LaunchProcessJob>) -> Self {
        Self { jobs_dir, storage }
    }

    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        std::fs::create_dir_all(&self.jobs_dir)?;
        info!(dir = %self.jobs_dir.display(), "Watching jobs directory {}", self.jobs_dir.display());
        loop {
            if let Err(e) = self.scan_once().await {
                warn!(error = %e, "Jobs directory scan failed");
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn scan_once(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let entries = std::fs::read_dir(&self.jobs_dir)?;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(descriptor) = JobDescriptor::from_file_name(&name) else {
                // Not a descriptor (editor droppings and the like).
                continue;
            };

            self.storage
                .push(LaunchProcessJob::from(descriptor.clone()))
                .await
                .map_err(|e| {
                    Box::new(std::io::Error::other(format!(
                        "Failed to enqueue launch job for {}: {}",
                        name, e
                    ))) as Box<dyn std::error::Error + Send + Sync>
                })?;
            info!(
                entity = %descriptor.entity,
                kind = %descriptor.kind,
                "Queued launch job from {}",
                name
            );

            if let Err(e) = std::fs::remove_file(&path) {
                warn!(file = %path.display(), error = %e, "Failed to remove processed descriptor");
            }
        }
        Ok(())
    }
}
