//! Local CSV ledgers
//!
//! Flat append-only files that survive store outages: one candle ledger per
//! symbol (`{data}/prices/{SYMBOL}.csv`) and one prediction ledger per
//! (symbol, model, version). Producers and consumers append after each
//! successful cycle; the producer also reads its ledger at startup to seed
//! the store when the ledger is ahead of it.

use crate::models::PriceCandle;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::Path;

const CANDLE_HEADER: &str = "open_time,open,high,low,close,volume";
const PREDICTION_HEADER: &str = "open_time,pred";

/// Read every candle in a ledger, oldest first. Missing file means empty.
pub fn load_candles(path: &Path) -> Result<Vec<PriceCandle>, Box<dyn std::error::Error + Send + Sync>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = std::fs::read_to_string(path)?;
    let mut candles = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        if i == 0 || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 6 {
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Malformed ledger line {} in {}", i + 1, path.display()),
            )));
        }
        candles.push(PriceCandle {
            open_time: fields[0].parse::<DateTime<Utc>>()?,
            open: fields[1].parse()?,
            high: fields[2].parse()?,
            low: fields[3].parse()?,
            close: fields[4].parse()?,
            volume: fields[5].parse()?,
        });
    }
    candles.sort_by_key(|c| c.open_time);
    Ok(candles)
}

/// Timestamp of the newest row in a candle ledger, if any.
pub fn last_candle_time(
    path: &Path,
) -> Result<Option<DateTime<Utc>>, Box<dyn std::error::Error + Send + Sync>> {
    Ok(load_candles(path)?.last().map(|c| c.open_time))
}

/// Append candles, creating the file (and parents) with a header on first use.
pub fn append_candles(
    path: &Path,
    candles: &[PriceCandle],
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if candles.is_empty() {
        return Ok(());
    }
    let mut file = open_append(path, CANDLE_HEADER)?;
    for c in candles {
        writeln!(
            file,
            "{},{},{},{},{},{}",
            c.open_time.to_rfc3339(),
            c.open,
            c.high,
            c.low,
            c.close,
            c.volume
        )?;
    }
    Ok(())
}

/// Append prediction rows (`open_time,pred`), creating on first use.
pub fn append_predictions(
    path: &Path,
    rows: &[(DateTime<Utc>, String)],
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if rows.is_empty() {
        return Ok(());
    }
    let mut file = open_append(path, PREDICTION_HEADER)?;
    for (open_time, pred) in rows {
        // Predictions are JSON vectors, so the value is quoted.
        writeln!(file, "{},\"{}\"", open_time.to_rfc3339(), pred.replace('"', "\"\""))?;
    }
    Ok(())
}

fn open_append(
    path: &Path,
    header: &str,
) -> Result<std::fs::File, Box<dyn std::error::Error + Send + Sync>> {
    let fresh = !path.exists();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    if fresh {
        writeln!(file, "{}", header)?;
    }
    Ok(file)
}
