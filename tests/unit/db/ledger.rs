//! Unit tests for the CSV ledgers

use candlecast::db::ledger;
use candlecast::models::PriceCandle;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

fn candle(minute: u32) -> PriceCandle {
    PriceCandle::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
        100.0 + minute as f64,
        110.0 + minute as f64,
        95.0,
        105.0,
        1.5,
    )
}

#[test]
fn test_missing_ledger_is_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("BTCUSDT.csv");
    assert!(ledger::load_candles(&path).unwrap().is_empty());
    assert!(ledger::last_candle_time(&path).unwrap().is_none());
}

#[test]
fn test_append_and_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("prices").join("BTCUSDT.csv");

    ledger::append_candles(&path, &[candle(0), candle(1)]).unwrap();
    ledger::append_candles(&path, &[candle(2)]).unwrap();

    let loaded = ledger::load_candles(&path).unwrap();
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded[0], candle(0));
    assert_eq!(loaded[2], candle(2));

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.starts_with("open_time,open,high,low,close,volume"));
    // Header written once.
    assert_eq!(contents.matches("open_time,").count(), 1);
}

#[test]
fn test_last_candle_time() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("BTCUSDT.csv");
    ledger::append_candles(&path, &[candle(5), candle(7)]).unwrap();
    assert_eq!(
        ledger::last_candle_time(&path).unwrap(),
        Some(candle(7).open_time)
    );
}

#[test]
fn test_malformed_line_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("BTCUSDT.csv");
    std::fs::write(&path, "open_time,open,high,low,close,volume\nnot,enough\n").unwrap();
    assert!(ledger::load_candles(&path).is_err());
}

#[test]
fn test_prediction_ledger_quotes_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("predictions").join("v1.csv");
    let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    ledger::append_predictions(&path, &[(t, "[0.1,0.2]".to_string())]).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.starts_with("open_time,pred"));
    assert!(contents.contains("\"[0.1,0.2]\""));
}
