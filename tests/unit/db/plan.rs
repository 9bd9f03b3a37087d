//! Unit tests for store write planning

use candlecast::db::plan::{
    batch_sizes, insert_placeholders, is_quota_error, plan_upsert, retention_cutoff, QuotaAction,
    QuotaGate, RETENTION_DAYS, STORE_BATCH_LIMIT,
};
use chrono::{Duration, TimeZone, Utc};
use std::collections::HashSet;

#[test]
fn test_batch_sizes_split() {
    assert_eq!(batch_sizes(1234, STORE_BATCH_LIMIT), vec![500, 500, 234]);
}

#[test]
fn test_batch_sizes_exact_multiple() {
    assert_eq!(batch_sizes(1000, 500), vec![500, 500]);
}

#[test]
fn test_batch_sizes_smaller_than_limit() {
    assert_eq!(batch_sizes(3, 500), vec![3]);
}

#[test]
fn test_batch_sizes_empty() {
    assert!(batch_sizes(0, 500).is_empty());
    assert!(batch_sizes(10, 0).is_empty());
}

#[test]
fn test_plan_upsert_partitions() {
    let requested = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let existing: HashSet<String> = ["b".to_string()].into_iter().collect();
    let plan = plan_upsert(&requested, &existing);
    assert_eq!(plan.updates, vec!["b"]);
    assert_eq!(plan.inserts, vec!["a", "c"]);
}

#[test]
fn test_plan_upsert_replay_produces_no_inserts() {
    let requested = vec!["a".to_string(), "b".to_string()];
    let first = plan_upsert(&requested, &HashSet::new());
    assert_eq!(first.inserts.len(), 2);

    // After the first delivery every key exists.
    let existing: HashSet<String> = requested.iter().cloned().collect();
    let second = plan_upsert(&requested, &existing);
    assert!(second.inserts.is_empty());
    assert_eq!(second.updates.len(), 2);
}

#[test]
fn test_quota_error_recognition() {
    assert!(is_quota_error("Quota exceeded for writes"));
    assert!(is_quota_error("server returned 429"));
    assert!(is_quota_error("RESOURCE EXHAUSTED: write budget"));
    assert!(!is_quota_error("connection refused"));
}

#[test]
fn test_quota_gate_retries_exactly_once() {
    let mut gate = QuotaGate::new();
    assert_eq!(
        gate.on_error("Quota exceeded for writes"),
        QuotaAction::RetryAfterBackoff
    );
    // The retry failing again, quota or not, propagates.
    assert_eq!(
        gate.on_error("Quota exceeded for writes"),
        QuotaAction::Propagate
    );
    assert_eq!(gate.on_error("connection refused"), QuotaAction::Propagate);
}

#[test]
fn test_quota_gate_passes_other_errors_through() {
    let mut gate = QuotaGate::new();
    assert_eq!(gate.on_error("connection refused"), QuotaAction::Propagate);
    // A non-quota failure does not consume the retry budget.
    assert_eq!(
        gate.on_error("server returned 429"),
        QuotaAction::RetryAfterBackoff
    );
}

#[test]
fn test_insert_placeholders_numbering() {
    assert_eq!(insert_placeholders(1, 3), "($1, $2, $3)");
    assert_eq!(
        insert_placeholders(2, 6),
        "($1, $2, $3, $4, $5, $6), ($7, $8, $9, $10, $11, $12)"
    );
    assert_eq!(insert_placeholders(0, 6), "");
}

#[test]
fn test_retention_cutoff() {
    let latest = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
    assert_eq!(
        retention_cutoff(latest),
        latest - Duration::days(RETENTION_DAYS)
    );
}
