//! Unit tests - organized by module structure

#[path = "unit/models/candle.rs"]
mod models_candle;

#[path = "unit/models/control.rs"]
mod models_control;

#[path = "unit/models/job.rs"]
mod models_job;

#[path = "unit/db/plan.rs"]
mod db_plan;

#[path = "unit/db/ledger.rs"]
mod db_ledger;

#[path = "unit/dispatch/launch.rs"]
mod dispatch_launch;

#[path = "unit/features/window.rs"]
mod features_window;

#[path = "unit/inference/version.rs"]
mod inference_version;

#[path = "unit/versioning/manager.rs"]
mod versioning_manager;
