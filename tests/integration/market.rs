//! Integration tests for the market data source

use candlecast::market::{BinanceSource, MarketDataSource};
use chrono::{TimeZone, Utc};
use serde_json::json;
use tokio_test::assert_err;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source(server: &MockServer) -> BinanceSource {
    BinanceSource::with_client(server.uri(), reqwest::Client::new())
}

fn kline(open_time_ms: i64, open: &str) -> serde_json::Value {
    json!([
        open_time_ms,
        open,
        "101.0",
        "99.0",
        "100.5",
        "12.34",
        open_time_ms + 59_999,
        "ignored"
    ])
}

#[tokio::test]
async fn fetches_and_parses_klines() {
    let server = MockServer::start().await;
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("symbol", "BTCUSDT"))
        .and(query_param("interval", "1m"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            kline(t0.timestamp_millis(), "100.0"),
            kline(t0.timestamp_millis() + 60_000, "100.5"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let candles = source(&server)
        .fetch_candles_after("BTCUSDT", None)
        .await
        .unwrap();
    assert_eq!(candles.len(), 2);
    assert_eq!(candles[0].open_time, t0);
    assert_eq!(candles[0].open, 100.0);
    assert_eq!(candles[0].volume, 12.34);
    assert!(candles[0].is_valid());
}

#[tokio::test]
async fn cursor_is_exclusive() {
    let server = MockServer::start().await;
    let after = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    // startTime is inclusive upstream, so the request must start one
    // millisecond past the cursor.
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param(
            "startTime",
            (after.timestamp_millis() + 1).to_string(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let candles = source(&server)
        .fetch_candles_after("BTCUSDT", Some(after))
        .await
        .unwrap();
    assert!(candles.is_empty());
}

#[tokio::test]
async fn upstream_error_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    assert_err!(source(&server).fetch_candles_after("BTCUSDT", None).await);
}

#[tokio::test]
async fn malformed_row_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([["too", "short"]])))
        .mount(&server)
        .await;

    assert_err!(source(&server).fetch_candles_after("BTCUSDT", None).await);
}
