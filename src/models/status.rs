//! Training job status records polled by the external workflow engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrainingState {
    Pending,
    Running,
    Success,
    Failed,
}

impl TrainingState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TrainingState::Success | TrainingState::Failed)
    }
}

impl fmt::Display for TrainingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrainingState::Pending => "PENDING",
            TrainingState::Running => "RUNNING",
            TrainingState::Success => "SUCCESS",
            TrainingState::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for TrainingState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TrainingState::Pending),
            "RUNNING" => Ok(TrainingState::Running),
            "SUCCESS" => Ok(TrainingState::Success),
            "FAILED" => Ok(TrainingState::Failed),
            other => Err(format!("unknown training state: {}", other)),
        }
    }
}

/// One row per (model, coin) training job in the active cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingJobStatus {
    pub model: String,
    pub coin: String,
    pub state: TrainingState,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}
