//! Candle and prediction persistence over the Postgres wire protocol
//!
//! One table per symbol. Candle columns are fixed; each (model, version)
//! pair gets its own sparse TEXT column holding a JSON float vector, added
//! lazily with ALTER TABLE. `open_time` is the dedup key, so every candle
//! write is idempotent.

use crate::config;
use crate::db::plan::{self, RETENTION_DAYS, STORE_BATCH_LIMIT, UPSERT_THRESHOLD};
use crate::models::candle::doc_id;
use crate::models::PriceCandle;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::Duration;
use tokio_postgres::{Client, NoTls};

/// Backoff applied once when the store reports quota pressure.
const QUOTA_BACKOFF_SECS: u64 = 60;

pub struct CandleStore {
    client: Client,
}

impl CandleStore {
    pub async fn connect() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Self::with_url(&config::get_store_url()).await
    }

    pub async fn with_url(url: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let (client, connection) = tokio_postgres::connect(url, NoTls).await.map_err(|e| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("Failed to connect to candle store: {}", e),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "Candle store connection error");
            }
        });

        Ok(Self { client })
    }

    /// Table names and prediction columns are interpolated into DDL, so they
    /// only ever come from validated identifiers.
    fn table_name(symbol: &str) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        validate_identifier(symbol)?;
        Ok(symbol.to_lowercase())
    }

    pub async fn ensure_table(
        &self,
        symbol: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let table = Self::table_name(symbol)?;
        self.client
            .execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        open_time TIMESTAMP,
                        open DOUBLE,
                        high DOUBLE,
                        low DOUBLE,
                        close DOUBLE,
                        volume DOUBLE
                    ) TIMESTAMP(open_time) PARTITION BY DAY WAL
                    DEDUP UPSERT KEYS(open_time)",
                    table
                ),
                &[],
            )
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to create table {}: {}",
                    table, e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;
        Ok(())
    }

    /// Add the per-version prediction column if it does not exist.
    pub async fn ensure_prediction_column(
        &self,
        symbol: &str,
        column: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let table = Self::table_name(symbol)?;
        validate_identifier(column)?;
        self.client
            .execute(
                &format!(
                    "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} STRING",
                    table, column
                ),
                &[],
            )
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to add prediction column {}.{}: {}",
                    table, column, e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;
        Ok(())
    }

    /// Persist candles in batches. Dedup on `open_time` makes replays
    /// harmless; any error propagates to the caller, which treats candle
    /// persistence as fatal.
    pub async fn insert_candles(
        &self,
        symbol: &str,
        candles: &[PriceCandle],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if candles.is_empty() {
            return Ok(());
        }
        let table = Self::table_name(symbol)?;
        let batches = plan::batch_sizes(candles.len(), STORE_BATCH_LIMIT);
        tracing::debug!(
            symbol = %symbol,
            rows = candles.len(),
            batches = batches.len(),
            "Persisting candles in {} batch(es)",
            batches.len()
        );

        for chunk in candles.chunks(STORE_BATCH_LIMIT) {
            let times: Vec<chrono::NaiveDateTime> =
                chunk.iter().map(|c| c.open_time.naive_utc()).collect();
            let mut params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * 6);
            for (candle, ts) in chunk.iter().zip(&times) {
                params.push(ts);
                params.push(&candle.open);
                params.push(&candle.high);
                params.push(&candle.low);
                params.push(&candle.close);
                params.push(&candle.volume);
            }
            let stmt = format!(
                "INSERT INTO {} (open_time, open, high, low, close, volume) VALUES {}",
                table,
                plan::insert_placeholders(chunk.len(), 6)
            );
            self.client.execute(&stmt, &params).await.map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to persist candle batch of {} rows into {}: {}",
                    chunk.len(),
                    table,
                    e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;
        }
        Ok(())
    }

    pub async fn last_open_time(
        &self,
        symbol: &str,
    ) -> Result<Option<DateTime<Utc>>, Box<dyn std::error::Error + Send + Sync>> {
        let table = Self::table_name(symbol)?;
        let rows = self
            .client
            .query(&format!("SELECT max(open_time) FROM {}", table), &[])
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to query last open_time for {}: {}",
                    table, e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;

        if let Some(row) = rows.first() {
            let ts: Option<chrono::NaiveDateTime> = row.get(0);
            return Ok(ts.map(|t| DateTime::from_naive_utc_and_offset(t, Utc)));
        }
        Ok(None)
    }

    /// Candles strictly after `after` (all rows when `None`), oldest first.
    pub async fn candles_after(
        &self,
        symbol: &str,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<PriceCandle>, Box<dyn std::error::Error + Send + Sync>> {
        let table = Self::table_name(symbol)?;
        let base = format!(
            "SELECT open_time, open, high, low, close, volume FROM {}",
            table
        );
        let rows = if let Some(after) = after {
            let after_naive = after.naive_utc();
            self.client
                .query(
                    &format!("{} WHERE open_time > $1 ORDER BY open_time", base),
                    &[&after_naive],
                )
                .await
        } else {
            self.client
                .query(&format!("{} ORDER BY open_time", base), &[])
                .await
        }
        .map_err(|e| {
            Box::new(std::io::Error::other(format!(
                "Failed to query candles for {}: {}",
                table, e
            ))) as Box<dyn std::error::Error + Send + Sync>
        })?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            let open_time_naive: chrono::NaiveDateTime = row.get(0);
            candles.push(PriceCandle {
                open_time: DateTime::from_naive_utc_and_offset(open_time_naive, Utc),
                open: row.get(1),
                high: row.get(2),
                low: row.get(3),
                close: row.get(4),
                volume: row.get(5),
            });
        }
        Ok(candles)
    }

    /// Candle rows after `after` that have no value yet in the prediction
    /// column. Drives historical reconciliation on consumer startup.
    pub async fn missing_prediction_times(
        &self,
        symbol: &str,
        column: &str,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<DateTime<Utc>>, Box<dyn std::error::Error + Send + Sync>> {
        let table = Self::table_name(symbol)?;
        validate_identifier(column)?;
        let base = format!(
            "SELECT open_time FROM {} WHERE {} IS NULL",
            table, column
        );
        let rows = if let Some(after) = after {
            let after_naive = after.naive_utc();
            self.client
                .query(
                    &format!("{} AND open_time > $1 ORDER BY open_time", base),
                    &[&after_naive],
                )
                .await
        } else {
            self.client
                .query(&format!("{} ORDER BY open_time", base), &[])
                .await
        }
        .map_err(|e| {
            Box::new(std::io::Error::other(format!(
                "Failed to query missing predictions for {}.{}: {}",
                table, column, e
            ))) as Box<dyn std::error::Error + Send + Sync>
        })?;

        Ok(rows
            .iter()
            .map(|row| {
                let t: chrono::NaiveDateTime = row.get(0);
                DateTime::from_naive_utc_and_offset(t, Utc)
            })
            .collect())
    }

    /// Document keys (among `times`) that already have a row in the table.
    async fn existing_keys(
        &self,
        table: &str,
        times: &[DateTime<Utc>],
    ) -> Result<HashSet<String>, Box<dyn std::error::Error + Send + Sync>> {
        let (min, max) = match bounds(times) {
            Some(b) => b,
            None => return Ok(HashSet::new()),
        };
        let min_naive = min.naive_utc();
        let max_naive = max.naive_utc();
        let rows = self
            .client
            .query(
                &format!(
                    "SELECT open_time FROM {} WHERE open_time >= $1 AND open_time <= $2",
                    table
                ),
                &[&min_naive, &max_naive],
            )
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to query existing rows for {}: {}",
                    table, e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;

        let requested: HashSet<String> = times.iter().map(|t| doc_id(*t)).collect();
        Ok(rows
            .iter()
            .map(|row| {
                let t: chrono::NaiveDateTime = row.get(0);
                doc_id(DateTime::from_naive_utc_and_offset(t, Utc))
            })
            .filter(|key| requested.contains(key))
            .collect())
    }

    /// Write prediction values keyed by `open_time`. Last write wins.
    ///
    /// Small batches go row-by-row: UPDATE each key, INSERT the ones the
    /// update did not touch. Large batches run a chunked bulk update pass,
    /// compute the missing complement with an existence query, and insert
    /// it. Either path ends by trimming rows past the retention horizon, so
    /// the table stays bounded in steady state and not just after backfills.
    pub async fn upsert_predictions(
        &self,
        symbol: &str,
        column: &str,
        rows: &[(DateTime<Utc>, String)],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if rows.is_empty() {
            return Ok(());
        }
        let table = Self::table_name(symbol)?;
        validate_identifier(column)?;

        if rows.len() < UPSERT_THRESHOLD {
            self.upsert_small(&table, column, rows).await?;
        } else {
            self.upsert_bulk(&table, column, rows).await?;
        }
        self.keep_recent(symbol).await
    }

    async fn upsert_small(
        &self,
        table: &str,
        column: &str,
        rows: &[(DateTime<Utc>, String)],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let update = format!(
            "UPDATE {} SET {} = $1 WHERE open_time = $2",
            table, column
        );
        let insert = format!(
            "INSERT INTO {} (open_time, {}) VALUES ($1, $2)",
            table, column
        );
        for (open_time, value) in rows {
            let ts = open_time.naive_utc();
            let touched = self
                .execute_with_quota_retry(&update, &[value, &ts])
                .await?;
            if touched == 0 {
                self.execute_with_quota_retry(&insert, &[&ts, value])
                    .await?;
            }
        }
        Ok(())
    }

    async fn upsert_bulk(
        &self,
        table: &str,
        column: &str,
        rows: &[(DateTime<Utc>, String)],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let update = format!(
            "UPDATE {} SET {} = $1 WHERE open_time = $2",
            table, column
        );
        let insert = format!(
            "INSERT INTO {} (open_time, {}) VALUES ($1, $2)",
            table, column
        );

        for chunk in rows.chunks(STORE_BATCH_LIMIT) {
            for (open_time, value) in chunk {
                let ts = open_time.naive_utc();
                self.execute_with_quota_retry(&update, &[value, &ts])
                    .await?;
            }

            let times: Vec<DateTime<Utc>> = chunk.iter().map(|(t, _)| *t).collect();
            let requested: Vec<String> = times.iter().map(|t| doc_id(*t)).collect();
            let existing = self.existing_keys(table, &times).await?;
            let upsert_plan = plan::plan_upsert(&requested, &existing);

            if !upsert_plan.inserts.is_empty() {
                tracing::debug!(
                    table = %table,
                    column = %column,
                    inserts = upsert_plan.inserts.len(),
                    "Inserting {} prediction rows missing from the store",
                    upsert_plan.inserts.len()
                );
                let missing: HashSet<&String> = upsert_plan.inserts.iter().collect();
                for (open_time, value) in chunk {
                    if missing.contains(&doc_id(*open_time)) {
                        let ts = open_time.naive_utc();
                        self.execute_with_quota_retry(&insert, &[&ts, value])
                            .await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Delete rows older than `latest - 180 days`, in bounded passes.
    pub async fn keep_recent(
        &self,
        symbol: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let table = Self::table_name(symbol)?;
        let latest = match self.last_open_time(symbol).await? {
            Some(latest) => latest,
            None => return Ok(()),
        };
        let cutoff = plan::retention_cutoff(latest);
        let cutoff_naive = cutoff.naive_utc();

        loop {
            let rows = self
                .client
                .query(
                    &format!(
                        "SELECT open_time FROM {} WHERE open_time < $1 ORDER BY open_time LIMIT {}",
                        table, STORE_BATCH_LIMIT
                    ),
                    &[&cutoff_naive],
                )
                .await
                .map_err(|e| {
                    Box::new(std::io::Error::other(format!(
                        "Failed to scan retention candidates for {}: {}",
                        table, e
                    ))) as Box<dyn std::error::Error + Send + Sync>
                })?;
            if rows.is_empty() {
                break;
            }

            let last: chrono::NaiveDateTime = rows[rows.len() - 1].get(0);
            let deleted = self
                .execute_with_quota_retry(
                    &format!(
                        "DELETE FROM {} WHERE open_time <= $1 AND open_time < $2",
                        table
                    ),
                    &[&last, &cutoff_naive],
                )
                .await?;
            tracing::info!(
                table = %table,
                deleted = deleted,
                retention_days = RETENTION_DAYS,
                "Trimmed {} rows past the retention horizon",
                deleted
            );
        }
        Ok(())
    }

    /// Run one statement; on a quota-style failure, back off 60 s and retry
    /// exactly once.
    async fn execute_with_quota_retry(
        &self,
        stmt: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
        let mut gate = plan::QuotaGate::new();
        loop {
            match self.client.execute(stmt, params).await {
                Ok(n) => return Ok(n),
                Err(e) => match gate.on_error(&e.to_string()) {
                    plan::QuotaAction::RetryAfterBackoff => {
                        tracing::warn!(
                            error = %e,
                            backoff_secs = QUOTA_BACKOFF_SECS,
                            "Store reported quota pressure, backing off before one retry"
                        );
                        tokio::time::sleep(Duration::from_secs(QUOTA_BACKOFF_SECS)).await;
                    }
                    plan::QuotaAction::Propagate => {
                        return Err(Box::new(std::io::Error::other(format!(
                            "Store write failed: {}",
                            e
                        ))));
                    }
                },
            }
        }
    }
}

fn validate_identifier(name: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Invalid store identifier: {}", name),
        )))
    }
}

fn bounds(times: &[DateTime<Utc>]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let min = times.iter().min()?;
    let max = times.iter().max()?;
    Some((*min, *max))
}
