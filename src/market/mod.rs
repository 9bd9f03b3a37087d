//! Upstream market data source
//!
//! The producer pulls minute klines over REST. The trait exists so tests can
//! swap the exchange for a canned source; the real implementation pages the
//! public klines endpoint with light pacing to stay under rate limits.

use crate::config;
use crate::models::PriceCandle;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tokio::time::{sleep, Duration};

/// Rows per klines page, the exchange-side maximum.
pub const PAGE_LIMIT: usize = 1000;
/// Pause between pages.
const PAGE_PACING_MS: u64 = 250;

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// All minute candles strictly after `after` (from the earliest
    /// available when `None`), oldest first.
    async fn fetch_candles_after(
        &self,
        symbol: &str,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<PriceCandle>, Box<dyn std::error::Error + Send + Sync>>;
}

pub struct BinanceSource {
    base_url: String,
    client: reqwest::Client,
}

impl BinanceSource {
    pub fn new() -> Self {
        Self::with_client(config::get_market_api_url(), reqwest::Client::new())
    }

    pub fn with_client(base_url: String, client: reqwest::Client) -> Self {
        Self { base_url, client }
    }

    async fn fetch_page(
        &self,
        symbol: &str,
        start_time_ms: Option<i64>,
    ) -> Result<Vec<PriceCandle>, Box<dyn std::error::Error + Send + Sync>> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let mut request = self
            .client
            .get(&url)
            .query(&[("symbol", symbol), ("interval", "1m")])
            .query(&[("limit", PAGE_LIMIT as i64)]);
        if let Some(start) = start_time_ms {
            request = request.query(&[("startTime", start)]);
        }

        let response = request.send().await.map_err(|e| {
            Box::new(std::io::Error::other(format!(
                "Klines request failed for {}: {}",
                symbol, e
            ))) as Box<dyn std::error::Error + Send + Sync>
        })?;
        if !response.status().is_success() {
            return Err(Box::new(std::io::Error::other(format!(
                "Klines request for {} returned {}",
                symbol,
                response.status()
            ))));
        }

        let rows: Vec<Value> = response.json().await.map_err(|e| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Failed to decode klines for {}: {}", symbol, e),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in &rows {
            candles.push(parse_kline(row)?);
        }
        Ok(candles)
    }
}

impl Default for BinanceSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataSource for BinanceSource {
    async fn fetch_candles_after(
        &self,
        symbol: &str,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<PriceCandle>, Box<dyn std::error::Error + Send + Sync>> {
        let mut all = Vec::new();
        // startTime is inclusive upstream, so nudge past the cursor.
        let mut cursor_ms = after.map(|t| t.timestamp_millis() + 1);

        loop {
            let page = self.fetch_page(symbol, cursor_ms).await?;
            let page_len = page.len();
            if let Some(last) = page.last() {
                cursor_ms = Some(last.open_time.timestamp_millis() + 1);
            }
            all.extend(page);
            if page_len < PAGE_LIMIT {
                break;
            }
            sleep(Duration::from_millis(PAGE_PACING_MS)).await;
        }

        tracing::debug!(
            symbol = %symbol,
            candles = all.len(),
            "Fetched {} candles from upstream",
            all.len()
        );
        Ok(all)
    }
}

/// One kline row: `[open_time_ms, "open", "high", "low", "close", "volume", …]`.
fn parse_kline(row: &Value) -> Result<PriceCandle, Box<dyn std::error::Error + Send + Sync>> {
    let fields = row.as_array().ok_or_else(|| invalid("kline row is not an array"))?;
    if fields.len() < 6 {
        return Err(invalid("kline row has fewer than 6 fields"));
    }
    let open_time_ms = fields[0]
        .as_i64()
        .ok_or_else(|| invalid("kline open time is not an integer"))?;
    let open_time = Utc
        .timestamp_millis_opt(open_time_ms)
        .single()
        .ok_or_else(|| invalid("kline open time out of range"))?;

    Ok(PriceCandle {
        open_time,
        open: parse_price(&fields[1])?,
        high: parse_price(&fields[2])?,
        low: parse_price(&fields[3])?,
        close: parse_price(&fields[4])?,
        volume: parse_price(&fields[5])?,
    })
}

fn parse_price(value: &Value) -> Result<f64, Box<dyn std::error::Error + Send + Sync>> {
    match value {
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|e| invalid(&format!("bad price field: {}", e))),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| invalid("price field out of range")),
        _ => Err(invalid("price field is neither string nor number")),
    }
}

fn invalid(msg: &str) -> Box<dyn std::error::Error + Send + Sync> {
    Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, msg.to_string()))
}
