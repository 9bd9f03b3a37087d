//! Unit tests for the three-slot version registry

use candlecast::versioning::VersionManager;
use tempfile::TempDir;

struct Fixture {
    _models: TempDir,
    _artifacts: TempDir,
    manager: VersionManager,
    artifact: std::path::PathBuf,
}

fn fixture() -> Fixture {
    let models = TempDir::new().unwrap();
    let artifacts = TempDir::new().unwrap();
    let artifact = artifacts.path().join("lightgbm_model.txt");
    std::fs::write(&artifact, "model-bytes").unwrap();
    std::fs::write(artifacts.path().join("lightgbm_features.json"), "[\"close\"]").unwrap();
    let manager = VersionManager::new(models.path());
    Fixture {
        manager,
        artifact,
        _models: models,
        _artifacts: artifacts,
    }
}

#[test]
fn test_baseline_is_write_once() {
    let fx = fixture();
    assert!(fx.manager.initialize_baseline("lightgbm", &fx.artifact).unwrap());
    // Second install is refused, not an error.
    assert!(!fx.manager.initialize_baseline("lightgbm", &fx.artifact).unwrap());

    let v1 = fx.manager.get_model_path("lightgbm", "v1").unwrap().unwrap();
    assert!(v1.join("lightgbm_model.txt").exists());
    // Side files travel with the artifact.
    assert!(v1.join("lightgbm_features.json").exists());
}

#[test]
fn test_first_registration_seeds_v2_from_v1() {
    let fx = fixture();
    fx.manager.initialize_baseline("lightgbm", &fx.artifact).unwrap();
    fx.manager.register_new_model("lightgbm", &fx.artifact).unwrap();

    let versions = fx.manager.get_all_versions("lightgbm").unwrap();
    let names: Vec<&str> = versions.iter().map(|(v, _)| v.as_str()).collect();
    assert_eq!(names, vec!["v1", "v2", "v3"]);

    let (_, v2) = versions.iter().find(|(v, _)| v == "v2").unwrap();
    assert_eq!(v2.created_from_v1, Some(true));
    assert!(std::path::Path::new(&v2.path).join("lightgbm_model.txt").exists());
}

#[test]
fn test_second_registration_promotes_v3_to_v2() {
    let fx = fixture();
    fx.manager.initialize_baseline("lightgbm", &fx.artifact).unwrap();
    fx.manager.register_new_model("lightgbm", &fx.artifact).unwrap();
    let first_v3_created = fx
        .manager
        .get_all_versions("lightgbm")
        .unwrap()
        .into_iter()
        .find(|(v, _)| v == "v3")
        .unwrap()
        .1
        .created_at;

    fx.manager.register_new_model("lightgbm", &fx.artifact).unwrap();

    let versions = fx.manager.get_all_versions("lightgbm").unwrap();
    let (_, v2) = versions.iter().find(|(v, _)| v == "v2").unwrap();
    assert!(v2.promoted_at.is_some());
    // The promoted slot keeps the original creation time.
    assert_eq!(v2.created_at, first_v3_created);
}

#[test]
fn test_rollback_backs_up_v3_and_records_provenance() {
    let fx = fixture();
    fx.manager.initialize_baseline("lightgbm", &fx.artifact).unwrap();
    fx.manager.register_new_model("lightgbm", &fx.artifact).unwrap();

    fx.manager.rollback_to_version("lightgbm", 1).unwrap();

    let versions = fx.manager.get_all_versions("lightgbm").unwrap();
    let (_, v3) = versions.iter().find(|(v, _)| v == "v3").unwrap();
    assert!(v3.rolled_back_at.is_some());

    let type_dir = fx._models.path().join("lightgbm");
    let backups: Vec<_> = std::fs::read_dir(&type_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("v3_backup_"))
        .collect();
    assert_eq!(backups.len(), 1);
}

#[test]
fn test_rollback_rejects_bad_target() {
    let fx = fixture();
    fx.manager.initialize_baseline("lightgbm", &fx.artifact).unwrap();
    assert!(fx.manager.rollback_to_version("lightgbm", 3).is_err());
    assert!(fx.manager.rollback_to_version("unknown-model", 1).is_err());
}

#[test]
fn test_history_log_grows_per_action() {
    let fx = fixture();
    fx.manager.initialize_baseline("lightgbm", &fx.artifact).unwrap();
    fx.manager.register_new_model("lightgbm", &fx.artifact).unwrap();

    let registry = fx.manager.load_registry().unwrap();
    let actions: Vec<&str> = registry
        .metadata
        .version_history
        .iter()
        .map(|h| h.action.as_str())
        .collect();
    assert_eq!(actions, vec!["initialize_baseline", "register_new_model"]);
}

#[test]
fn test_list_all_models() {
    let fx = fixture();
    fx.manager.initialize_baseline("lightgbm", &fx.artifact).unwrap();
    assert_eq!(fx.manager.list_all_models().unwrap(), vec!["lightgbm"]);
}
