//! Prediction consumer
//!
//! One process per (symbol, model, version). Startup: announce WAIT, block
//! until the orchestrator writes START, verify the model is servable, then
//! reconcile history before streaming. A monitor task watches the control
//! record so delete/pause take effect even while the main loop is blocked on
//! the stream.
//!
//! Prediction writes are idempotent (keyed by `open_time`, last write wins),
//! so redelivered candle batches and restarts never corrupt the table.

use crate::config;
use crate::control::ControlPlane;
use crate::db::{ledger, CandleStore};
use crate::features::{RollingWindow, SEQ_LEN};
use crate::inference::InferenceProvider;
use crate::models::{ControlState, EntityId, PriceCandle};
use crate::stream::CandleSubscriber;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const START_POLL: Duration = Duration::from_secs(1);
const MONITOR_POLL: Duration = Duration::from_secs(5);
const STREAM_BLOCK: Duration = Duration::from_secs(5);
const PAUSE_SLEEP: Duration = Duration::from_secs(5);

pub struct Consumer {
    entity: EntityId,
    store: CandleStore,
    inference: Box<dyn InferenceProvider>,
    control: ControlPlane,
    subscriber: CandleSubscriber,
    window: RollingWindow,
    paused: Arc<AtomicBool>,
    cursor: Option<DateTime<Utc>>,
}

impl Consumer {
    pub fn new(
        crypto: &str,
        model: &str,
        version: &str,
        store: CandleStore,
        inference: Box<dyn InferenceProvider>,
        control: ControlPlane,
        subscriber: CandleSubscriber,
    ) -> Self {
        Self {
            entity: EntityId::consumer(crypto, model, version),
            store,
            inference,
            control,
            subscriber,
            window: RollingWindow::new(),
            paused: Arc::new(AtomicBool::new(false)),
            cursor: None,
        }
    }

    /// Store column for this worker, `{model}_{N}` with the numeric slot.
    fn prediction_column(&self) -> String {
        format!(
            "{}_{}",
            self.entity.model,
            self.entity.version.trim_start_matches('v')
        )
    }

    fn ledger_path(&self) -> PathBuf {
        config::prediction_ledger_path(
            &self.entity.crypto,
            &self.entity.model,
            &self.entity.version,
        )
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.control
            .write(&self.entity, ControlState::Wait, None)
            .await?;
        tracing::info!(entity = %self.entity, "Consumer waiting for start signal");

        loop {
            match self.control.read_now(&self.entity).await? {
                ControlState::Start | ControlState::Running => break,
                ControlState::Delete => {
                    self.control
                        .write(&self.entity, ControlState::Deleted, None)
                        .await?;
                    tracing::info!(entity = %self.entity, "Consumer deleted before start");
                    return Ok(());
                }
                _ => sleep(START_POLL).await,
            }
        }

        self.control
            .write(&self.entity, ControlState::Running, None)
            .await?;

        if !self
            .inference
            .is_model_available(&self.entity.model, &self.entity.version)
            .await?
        {
            let msg = format!(
                "Model {}/{} is not servable",
                self.entity.model, self.entity.version
            );
            self.control
                .write(&self.entity, ControlState::Error, Some(&msg))
                .await?;
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                msg,
            )));
        }

        self.spawn_monitor();

        self.store
            .ensure_prediction_column(&self.entity.crypto, &self.prediction_column())
            .await?;
        // Gaps left behind here are picked up again on the next restart, so
        // a failed backfill must not keep the consumer off the stream.
        if let Err(e) = self.reconcile_history().await {
            tracing::error!(
                entity = %self.entity,
                error = %e,
                "Historical reconciliation failed, streaming anyway"
            );
        }
        self.seed_window().await?;

        tracing::info!(entity = %self.entity, "Consumer streaming");
        loop {
            if self.paused.load(Ordering::Relaxed) {
                sleep(PAUSE_SLEEP).await;
                continue;
            }
            match self.subscriber.next_batch(STREAM_BLOCK).await {
                Ok(batch) if batch.is_empty() => continue,
                Ok(batch) => {
                    if let Err(e) = self.process_batch(batch).await {
                        tracing::error!(entity = %self.entity, error = %e, "Failed to process candle batch");
                    }
                }
                Err(e) => {
                    tracing::error!(entity = %self.entity, error = %e, "Stream read failed");
                    sleep(STREAM_BLOCK).await;
                }
            }
        }
    }

    /// Watch the control record from a side task. Delete ends the process
    /// immediately (exit 0, the record already says DELETED); pause is
    /// reflected into the shared flag for the main loop.
    fn spawn_monitor(&self) {
        let control = self.control.clone();
        let entity = self.entity.clone();
        let paused = self.paused.clone();
        tokio::spawn(async move {
            loop {
                match control.read_now(&entity).await {
                    Ok(ControlState::Delete) => {
                        if let Err(e) = control.write(&entity, ControlState::Deleted, None).await {
                            tracing::error!(entity = %entity, error = %e, "Failed to acknowledge delete");
                        }
                        tracing::info!(entity = %entity, "Consumer received delete, exiting");
                        std::process::exit(0);
                    }
                    Ok(ControlState::Paused) => {
                        if !paused.swap(true, Ordering::Relaxed) {
                            tracing::info!(entity = %entity, "Consumer paused");
                        }
                    }
                    Ok(ControlState::Start) | Ok(ControlState::Running) => {
                        if paused.swap(false, Ordering::Relaxed) {
                            tracing::info!(entity = %entity, "Consumer resumed");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(entity = %entity, error = %e, "Monitor failed to read control record");
                    }
                }
                sleep(MONITOR_POLL).await;
            }
        });
    }

    /// Fill prediction gaps for candles already in the store. Runs once at
    /// startup so a consumer that was down for a while catches up before it
    /// starts tailing the stream.
    async fn reconcile_history(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let column = self.prediction_column();
        let missing = self
            .store
            .missing_prediction_times(&self.entity.crypto, &column, None)
            .await?;
        if missing.is_empty() {
            return Ok(());
        }

        let missing: std::collections::HashSet<DateTime<Utc>> = missing.into_iter().collect();
        let candles = self.store.candles_after(&self.entity.crypto, None).await?;
        let mut windows = Vec::new();
        let mut times = Vec::new();
        for (idx, candle) in candles.iter().enumerate() {
            if idx + 1 < SEQ_LEN || !missing.contains(&candle.open_time) {
                continue;
            }
            let window = &candles[idx + 1 - SEQ_LEN..=idx];
            windows.push(crate::features::preprocess_window(window));
            times.push(candle.open_time);
        }
        if windows.is_empty() {
            tracing::info!(
                entity = %self.entity,
                gaps = missing.len(),
                "No prediction gaps have enough history to backfill"
            );
            return Ok(());
        }

        tracing::info!(
            entity = %self.entity,
            rows = windows.len(),
            "Backfilling {} historical predictions",
            windows.len()
        );
        let predictions = self
            .inference
            .predict(&windows, &self.entity.model, &self.entity.version)
            .await?;
        let rows = prediction_rows(&times, &predictions)?;
        self.store
            .upsert_predictions(&self.entity.crypto, &column, &rows)
            .await?;
        self.cursor = times.last().copied();
        Ok(())
    }

    async fn seed_window(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let candles = self.store.candles_after(&self.entity.crypto, None).await?;
        let tail_start = candles.len().saturating_sub(SEQ_LEN);
        self.window.seed(&candles[tail_start..]);
        Ok(())
    }

    /// Score one streamed batch and upsert the result. Only the newest
    /// timestamp in the batch gets a prediction here; mid-batch rows are
    /// left to the reconciliation pass on the next restart. The cursor
    /// advances only after a successful upsert, and a redelivered batch
    /// is dropped by the cursor filter (with the window as a second guard)
    /// and produces no work.
    async fn process_batch(
        &mut self,
        mut batch: Vec<PriceCandle>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        batch.sort_by_key(|c| c.open_time);
        if let Some(cursor) = self.cursor {
            batch.retain(|c| c.open_time > cursor);
        }

        let mut advanced = false;
        for candle in batch {
            advanced |= self.window.push(candle);
        }
        if !advanced {
            return Ok(());
        }
        let (windows, times) = match (self.window.feature_vector(), self.window.latest_time()) {
            (Some(features), Some(latest)) => (vec![features], vec![latest]),
            _ => return Ok(()),
        };

        let predictions = self
            .inference
            .predict(&windows, &self.entity.model, &self.entity.version)
            .await?;
        let rows = prediction_rows(&times, &predictions)?;
        let column = self.prediction_column();
        self.store
            .upsert_predictions(&self.entity.crypto, &column, &rows)
            .await?;
        self.cursor = times.last().copied();

        if let Err(e) = ledger::append_predictions(&self.ledger_path(), &rows) {
            tracing::warn!(entity = %self.entity, error = %e, "Failed to append prediction ledger");
        }
        tracing::info!(
            entity = %self.entity,
            rows = rows.len(),
            cursor = %self.cursor.map(|t| t.to_rfc3339()).unwrap_or_default(),
            "Upserted {} predictions",
            rows.len()
        );
        Ok(())
    }
}

fn prediction_rows(
    times: &[DateTime<Utc>],
    predictions: &[Vec<f64>],
) -> Result<Vec<(DateTime<Utc>, String)>, Box<dyn std::error::Error + Send + Sync>> {
    if times.len() != predictions.len() {
        return Err(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "Got {} predictions for {} windows",
                predictions.len(),
                times.len()
            ),
        )));
    }
    let mut rows = Vec::with_capacity(times.len());
    for (time, prediction) in times.iter().zip(predictions) {
        rows.push((*time, serde_json::to_string(prediction)?));
    }
    Ok(rows)
}
