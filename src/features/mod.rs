//! Feature window construction for inference
//!
//! A consumer keeps a rolling window of the most recent candles per symbol.
//! Once the window is full, each candle batch yields one feature vector:
//! the five OHLCV columns min-max scaled within the window, flattened
//! row-major.

use crate::models::PriceCandle;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Candles per feature window.
pub const SEQ_LEN: usize = 30;

pub struct RollingWindow {
    buf: VecDeque<PriceCandle>,
}

impl RollingWindow {
    pub fn new() -> Self {
        Self {
            buf: VecDeque::with_capacity(SEQ_LEN),
        }
    }

    /// Seed the window from history, keeping only the newest `SEQ_LEN`.
    pub fn seed(&mut self, candles: &[PriceCandle]) {
        let mut sorted: Vec<&PriceCandle> = candles.iter().collect();
        sorted.sort_by_key(|c| c.open_time);
        for candle in sorted {
            self.push(candle.clone());
        }
    }

    /// Append one candle. Returns false (and does nothing) when the candle
    /// is not newer than the window head, which makes redelivered batches a
    /// no-op.
    pub fn push(&mut self, candle: PriceCandle) -> bool {
        if let Some(newest) = self.buf.back() {
            if candle.open_time <= newest.open_time {
                return false;
            }
        }
        if self.buf.len() == SEQ_LEN {
            self.buf.pop_front();
        }
        self.buf.push_back(candle);
        true
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() == SEQ_LEN
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn latest_time(&self) -> Option<DateTime<Utc>> {
        self.buf.back().map(|c| c.open_time)
    }

    /// Feature vector for the current window, `None` until full.
    pub fn feature_vector(&self) -> Option<Vec<f64>> {
        if !self.is_full() {
            return None;
        }
        let candles: Vec<PriceCandle> = self.buf.iter().cloned().collect();
        Some(preprocess_window(&candles))
    }
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Min-max scale each OHLCV column over the window, flatten row-major.
/// A constant column scales to 0.
pub fn preprocess_window(candles: &[PriceCandle]) -> Vec<f64> {
    let columns: [fn(&PriceCandle) -> f64; 5] = [
        |c| c.open,
        |c| c.high,
        |c| c.low,
        |c| c.close,
        |c| c.volume,
    ];

    let mut ranges = [(f64::INFINITY, f64::NEG_INFINITY); 5];
    for candle in candles {
        for (i, col) in columns.iter().enumerate() {
            let v = col(candle);
            ranges[i].0 = ranges[i].0.min(v);
            ranges[i].1 = ranges[i].1.max(v);
        }
    }

    let mut features = Vec::with_capacity(candles.len() * columns.len());
    for candle in candles {
        for (i, col) in columns.iter().enumerate() {
            let (min, max) = ranges[i];
            let span = max - min;
            let scaled = if span > 0.0 {
                (col(candle) - min) / span
            } else {
                0.0
            };
            features.push(scaled);
        }
    }
    features
}
