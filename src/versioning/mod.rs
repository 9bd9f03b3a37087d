//! Three-slot model version registry
//!
//! Each model type keeps exactly three on-disk slots under
//! `{models_dir}/{type}/v1..v3`: v1 is the write-once baseline, v2 the
//! previous production model, v3 the current one. Slot metadata lives in
//! `version_registry.json` next to the slot directories. Registry writes and
//! file copies are not transactional; a crash between them can leave the
//! registry one step behind the filesystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const REGISTRY_FILE: &str = "version_registry.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotInfo {
    pub path: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promoted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_from_v1: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolled_back_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelSlots {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v1: Option<SlotInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v2: Option<SlotInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v3: Option<SlotInfo>,
}

impl ModelSlots {
    pub fn slot(&self, version: &str) -> Option<&SlotInfo> {
        match version {
            "v1" => self.v1.as_ref(),
            "v2" => self.v2.as_ref(),
            "v3" => self.v3.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub model: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryMetadata {
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version_history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionRegistry {
    #[serde(default)]
    pub models: BTreeMap<String, ModelSlots>,
    #[serde(default)]
    pub metadata: RegistryMetadata,
}

pub struct VersionManager {
    models_dir: PathBuf,
}

impl VersionManager {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    fn registry_path(&self) -> PathBuf {
        self.models_dir.join(REGISTRY_FILE)
    }

    fn slot_dir(&self, model_type: &str, version: &str) -> PathBuf {
        self.models_dir.join(model_type).join(version)
    }

    pub fn load_registry(
        &self,
    ) -> Result<VersionRegistry, Box<dyn std::error::Error + Send + Sync>> {
        let path = self.registry_path();
        if !path.exists() {
            return Ok(VersionRegistry::default());
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save_registry(
        &self,
        registry: &mut VersionRegistry,
        history: HistoryEntry,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        registry.metadata.updated_at = Some(Utc::now());
        registry.metadata.version_history.push(history);
        std::fs::create_dir_all(&self.models_dir)?;
        std::fs::write(
            self.registry_path(),
            serde_json::to_string_pretty(registry)?,
        )?;
        Ok(())
    }

    /// Install the write-once v1 baseline. A second call for the same model
    /// type is a warning, not an error, and leaves v1 untouched.
    pub fn initialize_baseline(
        &self,
        model_type: &str,
        source: &Path,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let mut registry = self.load_registry()?;
        let slots = registry.models.entry(model_type.to_string()).or_default();
        if slots.v1.is_some() {
            tracing::warn!(
                model = %model_type,
                "Baseline v1 already installed for {}, skipping",
                model_type
            );
            return Ok(false);
        }

        let v1_dir = self.slot_dir(model_type, "v1");
        copy_model_files(model_type, source, &v1_dir)?;
        slots.v1 = Some(SlotInfo {
            path: v1_dir.to_string_lossy().into_owned(),
            created_at: Utc::now(),
            promoted_at: None,
            created_from_v1: None,
            rolled_back_at: None,
        });
        self.save_registry(
            &mut registry,
            HistoryEntry {
                model: model_type.to_string(),
                action: "initialize_baseline".to_string(),
                timestamp: Utc::now(),
            },
        )?;
        tracing::info!(model = %model_type, "Installed v1 baseline for {}", model_type);
        Ok(true)
    }

    /// Register a freshly trained model as v3, rotating the current v3 into
    /// v2 first. On the very first rotation, when v2 is still empty, v2 is
    /// seeded from v1 instead so that all three slots stay populated.
    pub fn register_new_model(
        &self,
        model_type: &str,
        source: &Path,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut registry = self.load_registry()?;
        let slots = registry.models.entry(model_type.to_string()).or_default();

        let v2_dir = self.slot_dir(model_type, "v2");
        let v3_dir = self.slot_dir(model_type, "v3");

        if let Some(current_v3) = slots.v3.take() {
            replace_dir(&v3_dir, &v2_dir)?;
            slots.v2 = Some(SlotInfo {
                path: v2_dir.to_string_lossy().into_owned(),
                promoted_at: Some(Utc::now()),
                ..current_v3
            });
            tracing::info!(model = %model_type, "Promoted v3 to v2 for {}", model_type);
        } else if slots.v2.is_none() {
            if let Some(v1) = slots.v1.clone() {
                copy_dir(Path::new(&v1.path), &v2_dir)?;
                slots.v2 = Some(SlotInfo {
                    path: v2_dir.to_string_lossy().into_owned(),
                    created_at: Utc::now(),
                    promoted_at: None,
                    created_from_v1: Some(true),
                    rolled_back_at: None,
                });
                tracing::info!(model = %model_type, "Seeded v2 from v1 baseline for {}", model_type);
            }
        }

        copy_model_files(model_type, source, &v3_dir)?;
        slots.v3 = Some(SlotInfo {
            path: v3_dir.to_string_lossy().into_owned(),
            created_at: Utc::now(),
            promoted_at: None,
            created_from_v1: None,
            rolled_back_at: None,
        });
        self.save_registry(
            &mut registry,
            HistoryEntry {
                model: model_type.to_string(),
                action: "register_new_model".to_string(),
                timestamp: Utc::now(),
            },
        )?;
        tracing::info!(model = %model_type, "Registered new v3 model for {}", model_type);
        Ok(())
    }

    /// Replace v3 with a copy of v1 or v2. The displaced v3 is kept in a
    /// timestamped backup directory, and the new v3 records where it came
    /// from via `rolled_back_at`.
    pub fn rollback_to_version(
        &self,
        model_type: &str,
        target: u8,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if target != 1 && target != 2 {
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Rollback target must be 1 or 2, got {}", target),
            )));
        }
        let target_version = format!("v{}", target);

        let mut registry = self.load_registry()?;
        let slots = registry.models.get_mut(model_type).ok_or_else(|| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("No registered model type: {}", model_type),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;
        let target_info = slots.slot(&target_version).cloned().ok_or_else(|| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Slot {} is empty for {}", target_version, model_type),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;

        let v3_dir = self.slot_dir(model_type, "v3");
        if v3_dir.exists() {
            let backup = self.models_dir.join(model_type).join(format!(
                "v3_backup_{}",
                Utc::now().format("%Y%m%d%H%M%S")
            ));
            std::fs::rename(&v3_dir, &backup)?;
            tracing::info!(
                model = %model_type,
                backup = %backup.display(),
                "Backed up current v3 before rollback"
            );
        }

        copy_dir(Path::new(&target_info.path), &v3_dir)?;
        slots.v3 = Some(SlotInfo {
            path: v3_dir.to_string_lossy().into_owned(),
            rolled_back_at: Some(Utc::now()),
            ..target_info
        });
        self.save_registry(
            &mut registry,
            HistoryEntry {
                model: model_type.to_string(),
                action: format!("rollback_to_{}", target_version),
                timestamp: Utc::now(),
            },
        )?;
        tracing::info!(
            model = %model_type,
            target = %target_version,
            "Rolled v3 back to {} for {}",
            target_version,
            model_type
        );
        Ok(())
    }

    pub fn get_model_path(
        &self,
        model_type: &str,
        version: &str,
    ) -> Result<Option<PathBuf>, Box<dyn std::error::Error + Send + Sync>> {
        let registry = self.load_registry()?;
        Ok(registry
            .models
            .get(model_type)
            .and_then(|slots| slots.slot(version))
            .map(|info| PathBuf::from(&info.path)))
    }

    pub fn get_all_versions(
        &self,
        model_type: &str,
    ) -> Result<Vec<(String, SlotInfo)>, Box<dyn std::error::Error + Send + Sync>> {
        let registry = self.load_registry()?;
        let mut versions = Vec::new();
        if let Some(slots) = registry.models.get(model_type) {
            for version in ["v1", "v2", "v3"] {
                if let Some(info) = slots.slot(version) {
                    versions.push((version.to_string(), info.clone()));
                }
            }
        }
        Ok(versions)
    }

    pub fn list_all_models(&self) -> Result<Vec<String>, Box<dyn std::error::Error + Send + Sync>> {
        let registry = self.load_registry()?;
        Ok(registry.models.keys().cloned().collect())
    }
}

/// Side files that travel with a model artifact, by model type.
fn is_side_file(model_type: &str, name: &str) -> bool {
    match model_type {
        "lightgbm" => name.contains("_features"),
        "tst" => name.contains("scaler"),
        _ => false,
    }
}

/// Copy the model artifact plus its matching side files into a slot
/// directory. `source` may be the artifact file itself or a directory of
/// artifacts.
fn copy_model_files(
    model_type: &str,
    source: &Path,
    dest: &Path,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    std::fs::create_dir_all(dest)?;
    if source.is_dir() {
        for entry in std::fs::read_dir(source)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() {
                std::fs::copy(&path, dest.join(entry.file_name()))?;
            }
        }
        return Ok(());
    }

    let file_name = source.file_name().ok_or_else(|| {
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Model source has no file name: {}", source.display()),
        )) as Box<dyn std::error::Error + Send + Sync>
    })?;
    std::fs::copy(source, dest.join(file_name))?;

    if let Some(parent) = source.parent() {
        for entry in std::fs::read_dir(parent)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.path().is_file() && is_side_file(model_type, &name) {
                std::fs::copy(entry.path(), dest.join(&name))?;
            }
        }
    }
    Ok(())
}

fn copy_dir(source: &Path, dest: &Path) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() {
            std::fs::copy(&path, dest.join(entry.file_name()))?;
        }
    }
    Ok(())
}

/// Move `from` into `to`, replacing whatever was there.
fn replace_dir(from: &Path, to: &Path) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if to.exists() {
        std::fs::remove_dir_all(to)?;
    }
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(from, to)?;
    Ok(())
}
