//! Fleet orchestration: bring the pipeline up, take it down
//!
//! Startup and shutdown never touch processes directly. Launches go through
//! descriptor files in the jobs directory (the dispatcher does the
//! spawning); shutdown goes through DELETE control records that each process
//! acknowledges on its own.

use crate::control::ControlPlane;
use crate::models::{ControlState, EntityId, JobDescriptor};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// How long startup waits for each process to report RUNNING.
pub const STARTUP_WAIT: Duration = Duration::from_secs(300);
/// Per-entity shutdown wait.
pub const ENTITY_SHUTDOWN_WAIT: Duration = Duration::from_secs(60);
/// Whole-fleet shutdown deadline.
pub const GLOBAL_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(600);

pub struct Orchestrator {
    control: ControlPlane,
    jobs_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(control: ControlPlane, jobs_dir: PathBuf) -> Self {
        Self { control, jobs_dir }
    }

    /// Write one descriptor into the jobs directory for the dispatcher.
    pub fn submit_job(
        &self,
        descriptor: &JobDescriptor,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        std::fs::create_dir_all(&self.jobs_dir)?;
        let path = self.jobs_dir.join(descriptor.file_name());
        std::fs::write(&path, descriptor.script_body())?;
        info!(
            entity = %descriptor.entity,
            file = %path.display(),
            "Submitted launch job for {}",
            descriptor.entity
        );
        Ok(())
    }

    /// Full pipeline startup: clear stale control state, launch the
    /// producer, then launch one consumer per (symbol, model, version).
    ///
    /// The producer not coming up is fatal, consumers without producer
    /// output are useless. A single consumer missing its deadline is only
    /// logged; the rest of the fleet still starts.
    pub async fn startup(
        &self,
        symbols: &[String],
        models: &[String],
        versions: &[String],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let cleared = self.control.delete_all().await?;
        info!(cleared = cleared, "Cleared {} stale control records", cleared);

        self.submit_job(&JobDescriptor::producer())?;
        let producer = EntityId::producer();
        let running = self
            .control
            .wait_for(
                &producer,
                |state| state == ControlState::Running,
                STARTUP_WAIT,
            )
            .await?;
        if !running {
            let msg = "Producer did not reach RUNNING within the startup deadline";
            error!("{}", msg);
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                msg,
            )));
        }
        info!("Producer is running");

        for symbol in symbols {
            for model in models {
                for version in versions {
                    let descriptor = JobDescriptor::consumer(symbol, model, version);
                    let entity = descriptor.entity.clone();
                    self.submit_job(&descriptor)?;
                    self.control
                        .write(&entity, ControlState::Start, None)
                        .await?;

                    let running = self
                        .control
                        .wait_for(
                            &entity,
                            |state| state == ControlState::Running,
                            STARTUP_WAIT,
                        )
                        .await?;
                    if running {
                        info!(entity = %entity, "Consumer {} is running", entity);
                    } else {
                        warn!(
                            entity = %entity,
                            "Consumer {} did not reach RUNNING within the startup deadline",
                            entity
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Broadcast DELETE to every live entity and wait for acknowledgements.
    ///
    /// Best effort by contract: waits are bounded per entity and globally,
    /// `stop` (set by a signal handler) skips any remaining waits, and the
    /// final control-plane wipe runs no matter what happened before it.
    pub async fn shutdown(
        &self,
        stop: Arc<AtomicBool>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let deadline = Instant::now() + GLOBAL_SHUTDOWN_DEADLINE;
        let entities = self.control.active_entities().await?;
        info!(entities = entities.len(), "Shutting down {} entities", entities.len());

        for entity in &entities {
            if let Err(e) = self.control.write(entity, ControlState::Delete, None).await {
                warn!(entity = %entity, error = %e, "Failed to send delete to {}", entity);
            }
        }

        for entity in &entities {
            if stop.load(Ordering::Relaxed) {
                warn!("Interrupted, skipping remaining shutdown waits");
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("Global shutdown deadline reached, skipping remaining waits");
                break;
            }
            let wait = ENTITY_SHUTDOWN_WAIT.min(remaining);
            match self
                .control
                .wait_for(entity, |state| state.is_gone(), wait)
                .await
            {
                Ok(true) => info!(entity = %entity, "Entity {} acknowledged delete", entity),
                Ok(false) => warn!(entity = %entity, "Entity {} did not acknowledge delete", entity),
                Err(e) => warn!(entity = %entity, error = %e, "Failed waiting on {}", entity),
            }
        }

        match self.control.delete_all().await {
            Ok(cleared) => info!(cleared = cleared, "Cleared {} control records", cleared),
            Err(e) => warn!(error = %e, "Final control-plane cleanup failed"),
        }
        Ok(())
    }
}
