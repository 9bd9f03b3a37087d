//! Typed launch-job descriptors
//!
//! The orchestrator requests process launches by dropping descriptor files
//! into a watched directory. The filename alone carries the full request:
//! `{CRYPTO}_{model}_{version}.sh`, with the producer addressed as
//! `ALL_producer_main.sh`. The file body is a human-readable script kept for
//! operator inspection; the dispatcher routes on the filename and never
//! interprets file contents as commands.

use crate::models::control::EntityId;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const JOB_FILE_EXT: &str = "sh";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessKind {
    Producer,
    Consumer,
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessKind::Producer => write!(f, "producer"),
            ProcessKind::Consumer => write!(f, "consumer"),
        }
    }
}

/// A request to launch one managed process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub kind: ProcessKind,
    pub entity: EntityId,
}

impl JobDescriptor {
    pub fn producer() -> Self {
        Self {
            kind: ProcessKind::Producer,
            entity: EntityId::producer(),
        }
    }

    pub fn consumer(crypto: &str, model: &str, version: &str) -> Self {
        Self {
            kind: ProcessKind::Consumer,
            entity: EntityId::consumer(crypto, model, version),
        }
    }

    /// Filename this descriptor is written under in the jobs directory.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.entity.key(), JOB_FILE_EXT)
    }

    /// Script body written into the descriptor file. Informational only,
    /// so an operator can see what the dispatcher will launch.
    pub fn script_body(&self) -> String {
        match self.kind {
            ProcessKind::Producer => {
                format!("#!/bin/bash\nproducer --symbol {}\n", self.entity.crypto)
            }
            ProcessKind::Consumer => format!(
                "#!/bin/bash\nconsumer --crypto {} --model {} --version {}\n",
                self.entity.crypto, self.entity.model, self.entity.version
            ),
        }
    }

    /// Parse a jobs-directory filename back into a descriptor.
    ///
    /// Returns `None` for files that do not follow the naming scheme, which
    /// lets the watcher skip editor temp files and the like without failing.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(&format!(".{}", JOB_FILE_EXT))?;
        let mut parts = stem.splitn(3, '_');
        let crypto = parts.next()?;
        let model = parts.next()?;
        let version = parts.next()?;
        if crypto.is_empty() || model.is_empty() || version.is_empty() {
            return None;
        }
        let entity = EntityId {
            crypto: crypto.to_string(),
            model: model.to_string(),
            version: version.to_string(),
        };
        let kind = if entity.is_producer() {
            ProcessKind::Producer
        } else {
            ProcessKind::Consumer
        };
        Some(Self { kind, entity })
    }
}
