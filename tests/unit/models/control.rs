//! Unit tests for control-plane records

use candlecast::models::{ControlRecord, ControlState, EntityId};
use std::str::FromStr;

#[test]
fn test_state_serializes_lowercase() {
    assert_eq!(
        serde_json::to_string(&ControlState::Running).unwrap(),
        "\"running\""
    );
    assert_eq!(
        serde_json::to_string(&ControlState::Deleted).unwrap(),
        "\"deleted\""
    );
}

#[test]
fn test_state_from_str() {
    assert_eq!(ControlState::from_str("start").unwrap(), ControlState::Start);
    // Legacy writers used the imperative form.
    assert_eq!(ControlState::from_str("pause").unwrap(), ControlState::Paused);
    assert!(ControlState::from_str("bogus").is_err());
}

#[test]
fn test_gone_states() {
    assert!(ControlState::Deleted.is_gone());
    assert!(ControlState::Unknown.is_gone());
    assert!(!ControlState::Delete.is_gone());
    assert!(!ControlState::Running.is_gone());
}

#[test]
fn test_entity_key() {
    let entity = EntityId::consumer("btcusdt", "LightGBM", "V2");
    assert_eq!(entity.key(), "BTCUSDT_lightgbm_v2");
    assert_eq!(entity.to_string(), "BTCUSDT/lightgbm/v2");
}

#[test]
fn test_producer_entity() {
    let producer = EntityId::producer();
    assert_eq!(producer.key(), "ALL_producer_main");
    assert!(producer.is_producer());
    assert!(!EntityId::consumer("BTCUSDT", "tst", "v1").is_producer());
}

#[test]
fn test_record_round_trip() {
    let entity = EntityId::consumer("BTCUSDT", "tst", "v1");
    let record = ControlRecord::new(&entity, ControlState::Error, Some("boom"));
    let json = serde_json::to_string(&record).unwrap();
    let back: ControlRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back.state, ControlState::Error);
    assert_eq!(back.error_msg, "boom");
    assert_eq!(back.crypto, "BTCUSDT");
}

#[test]
fn test_record_missing_error_defaults_empty() {
    let json = r#"{"crypto":"BTCUSDT","model":"tst","version":"v1",
                   "state":"running","updated_at":"2024-05-01T12:30:00Z"}"#;
    let record: ControlRecord = serde_json::from_str(json).unwrap();
    assert_eq!(record.state, ControlState::Running);
    assert!(record.error_msg.is_empty());
}
