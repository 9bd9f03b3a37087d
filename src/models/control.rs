//! Control-plane state records
//!
//! One record per managed entity. The producer is addressed as the special
//! entity `ALL/producer/main`; consumers as `{SYMBOL}/{model}/{version}`.
//! Transitions are driven by two writers at most (orchestrator + the process
//! itself) and are monotonic in practice, so last-write-wins is acceptable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of lifecycle states an entity can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlState {
    Pending,
    Wait,
    Start,
    Running,
    Paused,
    Delete,
    Deleted,
    Error,
    /// Read sentinel: the record does not exist (never written).
    Unknown,
}

impl ControlState {
    /// Terminal states that a shutdown wait treats as "gone".
    pub fn is_gone(self) -> bool {
        matches!(self, ControlState::Deleted | ControlState::Unknown)
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControlState::Pending => "pending",
            ControlState::Wait => "wait",
            ControlState::Start => "start",
            ControlState::Running => "running",
            ControlState::Paused => "paused",
            ControlState::Delete => "delete",
            ControlState::Deleted => "deleted",
            ControlState::Error => "error",
            ControlState::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ControlState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ControlState::Pending),
            "wait" => Ok(ControlState::Wait),
            "start" => Ok(ControlState::Start),
            "running" => Ok(ControlState::Running),
            "paused" | "pause" => Ok(ControlState::Paused),
            "delete" => Ok(ControlState::Delete),
            "deleted" => Ok(ControlState::Deleted),
            "error" => Ok(ControlState::Error),
            "unknown" => Ok(ControlState::Unknown),
            other => Err(format!("unknown control state: {}", other)),
        }
    }
}

/// Address of one managed process in the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId {
    pub crypto: String,
    pub model: String,
    pub version: String,
}

impl EntityId {
    pub fn consumer(crypto: &str, model: &str, version: &str) -> Self {
        Self {
            crypto: crypto.to_uppercase(),
            model: model.to_lowercase(),
            version: version.to_lowercase(),
        }
    }

    /// The singleton producer entity.
    pub fn producer() -> Self {
        Self {
            crypto: "ALL".to_string(),
            model: "producer".to_string(),
            version: "main".to_string(),
        }
    }

    pub fn is_producer(&self) -> bool {
        self.crypto == "ALL" && self.model == "producer"
    }

    /// Flat key used both for redis keys and descriptor filenames.
    pub fn key(&self) -> String {
        format!("{}_{}_{}", self.crypto, self.model, self.version)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.crypto, self.model, self.version)
    }
}

/// The full record stored per entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRecord {
    pub crypto: String,
    pub model: String,
    pub version: String,
    pub state: ControlState,
    #[serde(default)]
    pub error_msg: String,
    pub updated_at: DateTime<Utc>,
}

impl ControlRecord {
    pub fn new(entity: &EntityId, state: ControlState, error_msg: Option<&str>) -> Self {
        Self {
            crypto: entity.crypto.clone(),
            model: entity.model.clone(),
            version: entity.version.clone(),
            state,
            error_msg: error_msg.unwrap_or_default().to_string(),
            updated_at: Utc::now(),
        }
    }
}
