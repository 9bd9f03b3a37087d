//! Job types for the process launch workflow

use crate::models::{JobDescriptor, ProcessKind};
use serde::{Deserialize, Serialize};

/// Job to launch one managed process (producer or consumer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchProcessJob {
    pub kind: ProcessKind,
    pub crypto: String,
    pub model: String,
    pub version: String,
}

impl From<JobDescriptor> for LaunchProcessJob {
    fn from(descriptor: JobDescriptor) -> Self {
        Self {
            kind: descriptor.kind,
            crypto: descriptor.entity.crypto,
            model: descriptor.entity.model,
            version: descriptor.entity.version,
        }
    }
}
