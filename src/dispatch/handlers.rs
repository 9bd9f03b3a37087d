//! Handlers for the process launch workflow
//!
//! Launches are typed end to end: the handler maps the job onto an argv for
//! the producer or consumer binary and never goes through a shell. Spawn
//! failures are logged and swallowed so the queue does not retry a launch
//! that will keep failing.

use crate::dispatch::context::DispatchContext;
use crate::dispatch::types::LaunchProcessJob;
use crate::models::{ControlState, EntityId, ProcessKind};
use apalis::prelude::*;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{error, info};

/// Whether a fresh launch has to clear the entity's existing control record.
/// Only terminal leftovers from a previous incarnation are cleared; a live
/// signal, the orchestrator's START in particular, must survive the hop
/// through the descriptor file and the queue.
pub fn needs_reset(state: ControlState) -> bool {
    matches!(
        state,
        ControlState::Delete | ControlState::Deleted | ControlState::Error
    )
}

pub async fn handle_launch(
    job: LaunchProcessJob,
    ctx: Data<Arc<DispatchContext>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match job.kind {
        ProcessKind::Producer => {
            info!(symbol = %job.crypto, "LaunchProcessJob: launching producer");
            spawn_detached(
                Command::new(&ctx.producer_bin).args(["--symbol", &job.crypto]),
                "producer",
            );
        }
        ProcessKind::Consumer => {
            let entity = EntityId::consumer(&job.crypto, &job.model, &job.version);
            let state = ctx.control.read_now(&entity).await?;
            if needs_reset(state) {
                info!(
                    entity = %entity,
                    state = %state,
                    "LaunchProcessJob: clearing stale terminal record for {}",
                    entity
                );
                if let Err(e) = ctx.control.delete(&entity).await {
                    error!(
                        entity = %entity,
                        error = %e,
                        "LaunchProcessJob: failed to reset control record for {}",
                        entity
                    );
                    return Err(e);
                }
            }
            info!(entity = %entity, "LaunchProcessJob: launching consumer for {}", entity);
            spawn_detached(
                Command::new(&ctx.consumer_bin).args([
                    "--crypto",
                    &job.crypto,
                    "--model",
                    &job.model,
                    "--version",
                    &job.version,
                ]),
                "consumer",
            );
        }
    }
    Ok(())
}

fn spawn_detached(command: &mut Command, kind: &str) {
    match command.spawn() {
        Ok(child) => {
            info!(
                kind = %kind,
                pid = child.id().unwrap_or_default(),
                "LaunchProcessJob: {} process spawned",
                kind
            );
        }
        Err(e) => {
            error!(kind = %kind, error = %e, "LaunchProcessJob: failed to spawn {} process", kind);
        }
    }
}
