//! Training batch status table
//!
//! External workflow tooling polls `batch_status` to decide when a training
//! cycle is finished. One row per (model, coin), plus a `trl/ALL` aggregate
//! row for the overall cycle.

use crate::config;
use crate::db::plan::STORE_BATCH_LIMIT;
use crate::models::{TrainingJobStatus, TrainingState};
use chrono::{DateTime, Utc};
use std::str::FromStr;
use tokio_postgres::{Client, NoTls};

const TABLE: &str = "batch_status";

pub struct StatusStore {
    client: Client,
}

impl StatusStore {
    pub async fn connect() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Self::with_url(&config::get_store_url()).await
    }

    pub async fn with_url(url: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let (client, connection) = tokio_postgres::connect(url, NoTls).await.map_err(|e| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("Failed to connect to status store: {}", e),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "Status store connection error");
            }
        });

        let store = Self { client };
        store.ensure_table().await?;
        Ok(store)
    }

    async fn ensure_table(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.client
            .execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        model STRING,
                        coin STRING,
                        state STRING,
                        error_message STRING,
                        updated_at TIMESTAMP
                    )",
                    TABLE
                ),
                &[],
            )
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to create {} table: {}",
                    TABLE, e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;
        Ok(())
    }

    /// Remove every row, in bounded passes.
    pub async fn flush(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        loop {
            let rows = self
                .client
                .query(
                    &format!("SELECT model, coin FROM {} LIMIT {}", TABLE, STORE_BATCH_LIMIT),
                    &[],
                )
                .await
                .map_err(|e| {
                    Box::new(std::io::Error::other(format!(
                        "Failed to scan {} for flush: {}",
                        TABLE, e
                    ))) as Box<dyn std::error::Error + Send + Sync>
                })?;
            if rows.is_empty() {
                return Ok(());
            }
            for row in &rows {
                let model: String = row.get(0);
                let coin: String = row.get(1);
                self.client
                    .execute(
                        &format!("DELETE FROM {} WHERE model = $1 AND coin = $2", TABLE),
                        &[&model, &coin],
                    )
                    .await
                    .map_err(|e| {
                        Box::new(std::io::Error::other(format!(
                            "Failed to flush {} row: {}",
                            TABLE, e
                        ))) as Box<dyn std::error::Error + Send + Sync>
                    })?;
            }
        }
    }

    /// Reset the table for a new training cycle: PENDING per model x coin,
    /// plus the `trl/ALL` aggregate row.
    pub async fn init_entries(
        &self,
        models: &[String],
        coins: &[String],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.flush().await?;
        for model in models {
            for coin in coins {
                self.set_state(model, coin, TrainingState::Pending, None)
                    .await?;
            }
        }
        self.set_state("trl", "ALL", TrainingState::Pending, None)
            .await?;
        tracing::info!(
            models = models.len(),
            coins = coins.len(),
            "Initialized {} training status entries",
            models.len() * coins.len() + 1
        );
        Ok(())
    }

    /// Merge-upsert one (model, coin) row.
    pub async fn set_state(
        &self,
        model: &str,
        coin: &str,
        state: TrainingState,
        error_message: Option<&str>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let now = Utc::now().naive_utc();
        let state_str = state.to_string();
        let error = error_message.unwrap_or_default();

        let touched = self
            .client
            .execute(
                &format!(
                    "UPDATE {} SET state = $1, error_message = $2, updated_at = $3
                     WHERE model = $4 AND coin = $5",
                    TABLE
                ),
                &[&state_str, &error, &now, &model, &coin],
            )
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to update {} row: {}",
                    TABLE, e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;

        if touched == 0 {
            self.client
                .execute(
                    &format!(
                        "INSERT INTO {} (model, coin, state, error_message, updated_at)
                         VALUES ($1, $2, $3, $4, $5)",
                        TABLE
                    ),
                    &[&model, &coin, &state_str, &error, &now],
                )
                .await
                .map_err(|e| {
                    Box::new(std::io::Error::other(format!(
                        "Failed to insert {} row: {}",
                        TABLE, e
                    ))) as Box<dyn std::error::Error + Send + Sync>
                })?;
        }
        Ok(())
    }

    /// Full snapshot of the current cycle.
    pub async fn get_status(
        &self,
    ) -> Result<Vec<TrainingJobStatus>, Box<dyn std::error::Error + Send + Sync>> {
        let rows = self
            .client
            .query(
                &format!(
                    "SELECT model, coin, state, error_message, updated_at FROM {}
                     ORDER BY model, coin",
                    TABLE
                ),
                &[],
            )
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to query {}: {}",
                    TABLE, e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;

        let mut statuses = Vec::with_capacity(rows.len());
        for row in rows {
            let state_str: String = row.get(2);
            let state = TrainingState::from_str(&state_str).map_err(|e| {
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
                    as Box<dyn std::error::Error + Send + Sync>
            })?;
            let error_message: String = row.get(3);
            let updated_at_naive: chrono::NaiveDateTime = row.get(4);
            statuses.push(TrainingJobStatus {
                model: row.get(0),
                coin: row.get(1),
                state,
                error_message: if error_message.is_empty() {
                    None
                } else {
                    Some(error_message)
                },
                updated_at: DateTime::from_naive_utc_and_offset(updated_at_naive, Utc),
            });
        }
        Ok(statuses)
    }
}
