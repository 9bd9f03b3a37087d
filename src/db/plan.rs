//! Pure planning helpers for store writes
//!
//! Kept free of I/O so batching, upsert partitioning and retention math can
//! be tested without a database.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

/// Maximum rows per store round trip.
pub const STORE_BATCH_LIMIT: usize = 500;

/// Below this many rows an upsert goes row-by-row; at or above it, bulk.
pub const UPSERT_THRESHOLD: usize = 100;

/// Rows older than this are trimmed after every prediction upsert.
pub const RETENTION_DAYS: i64 = 180;

/// Split `total` rows into chunk sizes no larger than `limit`.
pub fn batch_sizes(total: usize, limit: usize) -> Vec<usize> {
    if total == 0 || limit == 0 {
        return Vec::new();
    }
    let mut sizes = vec![limit; total / limit];
    if total % limit != 0 {
        sizes.push(total % limit);
    }
    sizes
}

/// Partition of one upsert batch into rows to update vs rows to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertPlan {
    pub updates: Vec<String>,
    pub inserts: Vec<String>,
}

/// Given the requested keys and the set that already exists in the store,
/// decide which rows get an UPDATE and which get an INSERT. Inserts are the
/// complement, so replaying the same batch produces an empty insert set.
pub fn plan_upsert(requested: &[String], existing: &HashSet<String>) -> UpsertPlan {
    let mut updates = Vec::new();
    let mut inserts = Vec::new();
    for key in requested {
        if existing.contains(key) {
            updates.push(key.clone());
        } else {
            inserts.push(key.clone());
        }
    }
    UpsertPlan { updates, inserts }
}

/// Whether a store error message indicates rate/quota pressure that deserves
/// a single long backoff instead of immediate failure.
pub fn is_quota_error(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("quota") || lower.contains("429") || lower.contains("resource exhausted")
}

/// What to do with a failed store statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaAction {
    RetryAfterBackoff,
    Propagate,
}

/// One-shot retry decision for quota-style failures: the first quota error
/// on a statement earns a single backoff-and-retry, every other error (and
/// any second failure) propagates.
#[derive(Debug, Default)]
pub struct QuotaGate {
    retried: bool,
}

impl QuotaGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_error(&mut self, msg: &str) -> QuotaAction {
        if !self.retried && is_quota_error(msg) {
            self.retried = true;
            QuotaAction::RetryAfterBackoff
        } else {
            QuotaAction::Propagate
        }
    }
}

/// Placeholder groups for a multi-row INSERT, `($1, $2), ($3, $4)` style.
pub fn insert_placeholders(rows: usize, cols: usize) -> String {
    (0..rows)
        .map(|row| {
            let group: Vec<String> = (1..=cols)
                .map(|col| format!("${}", row * cols + col))
                .collect();
            format!("({})", group.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Cutoff for prediction retention, relative to the latest stored row.
pub fn retention_cutoff(latest: DateTime<Utc>) -> DateTime<Utc> {
    latest - Duration::days(RETENTION_DAYS)
}
