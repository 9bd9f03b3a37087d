//! Unit tests for candle records

use candlecast::models::candle::doc_id;
use candlecast::models::PriceCandle;
use chrono::{TimeZone, Utc};

fn candle() -> PriceCandle {
    PriceCandle::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
        100.0,
        110.0,
        95.0,
        105.0,
        42.0,
    )
}

#[test]
fn test_doc_id_is_rfc3339_seconds() {
    assert_eq!(candle().doc_id(), "2024-05-01T12:30:00Z");
}

#[test]
fn test_doc_id_is_deterministic() {
    let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
    assert_eq!(doc_id(t), doc_id(t));
}

#[test]
fn test_valid_candle() {
    assert!(candle().is_valid());
}

#[test]
fn test_invalid_when_high_below_close() {
    let mut c = candle();
    c.high = 90.0;
    assert!(!c.is_valid());
}

#[test]
fn test_invalid_when_volume_negative() {
    let mut c = candle();
    c.volume = -1.0;
    assert!(!c.is_valid());
}

#[test]
fn test_serde_round_trip() {
    let c = candle();
    let json = serde_json::to_string(&c).unwrap();
    let back: PriceCandle = serde_json::from_str(&json).unwrap();
    assert_eq!(c, back);
}
