//! OHLCV price candle

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One minute-granularity OHLCV candle.
///
/// The symbol is carried by context (table name, topic, ledger path) rather
/// than repeated on every record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceCandle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceCandle {
    pub fn new(
        open_time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Deterministic document key: the same candle always maps to the same
    /// key, which is what makes every store write idempotent.
    pub fn doc_id(&self) -> String {
        doc_id(self.open_time)
    }

    /// OHLCV sanity: high bounds everything from above, low from below,
    /// volume is non-negative.
    pub fn is_valid(&self) -> bool {
        self.high >= self.open.max(self.close).max(self.low)
            && self.low <= self.open.min(self.close).min(self.high)
            && self.volume >= 0.0
    }
}

/// RFC 3339 document key for a timestamp.
pub fn doc_id(open_time: DateTime<Utc>) -> String {
    open_time.to_rfc3339_opts(SecondsFormat::Secs, true)
}
