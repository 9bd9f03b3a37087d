//! Candle producer
//!
//! Single process feeding every configured symbol: poll the upstream market
//! source for candles after the per-symbol cursor, persist them (fatal on
//! failure), append the local ledger (best effort), publish to the stream,
//! then sleep to the next minute boundary. Lifecycle is driven through the
//! control plane under the `ALL/producer/main` entity.

use crate::config;
use crate::control::ControlPlane;
use crate::db::{ledger, CandleStore};
use crate::market::MarketDataSource;
use crate::models::{ControlState, EntityId, PriceCandle};
use crate::stream::CandlePublisher;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::sleep;

/// Fires at second 0 of every minute.
const MINUTE_SCHEDULE: &str = "0 * * * * *";
const IDLE_SLEEP: Duration = Duration::from_secs(60);
const ERROR_SLEEP: Duration = Duration::from_secs(10);
const PAUSE_SLEEP: Duration = Duration::from_secs(10);

pub struct Producer {
    symbols: Vec<String>,
    store: CandleStore,
    source: Box<dyn MarketDataSource>,
    publisher: CandlePublisher,
    control: ControlPlane,
    entity: EntityId,
    cursors: HashMap<String, Option<DateTime<Utc>>>,
    schedule: Schedule,
}

impl Producer {
    pub fn new(
        symbols: Vec<String>,
        store: CandleStore,
        source: Box<dyn MarketDataSource>,
        publisher: CandlePublisher,
        control: ControlPlane,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let schedule = Schedule::from_str(MINUTE_SCHEDULE).map_err(|e| {
            Box::new(std::io::Error::other(format!(
                "Invalid producer schedule: {}",
                e
            ))) as Box<dyn std::error::Error + Send + Sync>
        })?;
        Ok(Self {
            symbols,
            store,
            source,
            publisher,
            control,
            entity: EntityId::producer(),
            cursors: HashMap::new(),
            schedule,
        })
    }

    fn ledger_path(symbol: &str) -> PathBuf {
        config::price_ledger_path(symbol)
    }

    /// Seed the per-symbol cursor from store and ledger. When the ledger is
    /// ahead of the store (store wiped, ledger survived), its tail is synced
    /// back into the store, capped so a huge ledger cannot stall startup.
    async fn sync_symbol(
        &mut self,
        symbol: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.store.ensure_table(symbol).await?;
        let store_last = self.store.last_open_time(symbol).await?;
        let ledger_path = Self::ledger_path(symbol);
        let ledger_last = ledger::last_candle_time(&ledger_path)?;

        let mut cursor = store_last;
        if ledger_last > store_last {
            let max_rows = config::get_max_initial_sync_rows();
            let candles = ledger::load_candles(&ledger_path)?;
            let mut behind: Vec<PriceCandle> = candles
                .into_iter()
                .filter(|c| Some(c.open_time) > store_last)
                .collect();
            if behind.len() > max_rows {
                tracing::warn!(
                    symbol = %symbol,
                    rows = behind.len(),
                    cap = max_rows,
                    "Ledger is far ahead of the store, syncing only the newest {} rows",
                    max_rows
                );
                behind = behind.split_off(behind.len() - max_rows);
            }
            tracing::info!(
                symbol = %symbol,
                rows = behind.len(),
                "Syncing ledger rows into the store for {}",
                symbol
            );
            self.store.insert_candles(symbol, &behind).await?;
            cursor = behind.last().map(|c| c.open_time).or(cursor);
        }

        self.cursors.insert(symbol.to_string(), cursor);
        Ok(())
    }

    /// One fetch/persist/publish pass for one symbol. Returns how many
    /// candles were published. Persistence errors are fatal and propagate;
    /// ledger append failures only warn.
    async fn cycle_symbol(
        &mut self,
        symbol: &str,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        let cursor = self.cursors.get(symbol).copied().flatten();
        let candles = self.source.fetch_candles_after(symbol, cursor).await?;
        if candles.is_empty() {
            return Ok(0);
        }

        self.store.insert_candles(symbol, &candles).await?;

        if let Err(e) = ledger::append_candles(&Self::ledger_path(symbol), &candles) {
            tracing::warn!(symbol = %symbol, error = %e, "Failed to append candle ledger for {}", symbol);
        }

        self.publisher.publish(symbol, &candles).await?;

        // Advance only after publish so a failed cycle refetches the same
        // rows; dedup keys make the replay harmless.
        if let Some(last) = candles.last() {
            self.cursors
                .insert(symbol.to_string(), Some(last.open_time));
        }
        tracing::info!(
            symbol = %symbol,
            candles = candles.len(),
            "Published {} new candles for {}",
            candles.len(),
            symbol
        );
        Ok(candles.len())
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let symbols = self.symbols.clone();
        for symbol in &symbols {
            self.sync_symbol(symbol).await?;
        }
        self.control
            .write(&self.entity, ControlState::Running, None)
            .await?;
        tracing::info!(symbols = symbols.len(), "Producer running for {} symbols", symbols.len());

        loop {
            match self.control.read_now(&self.entity).await? {
                ControlState::Delete => {
                    self.control
                        .write(&self.entity, ControlState::Deleted, None)
                        .await?;
                    tracing::info!("Producer received delete, shutting down");
                    return Ok(());
                }
                ControlState::Paused => {
                    sleep(PAUSE_SLEEP).await;
                    continue;
                }
                ControlState::Start => {
                    self.control
                        .write(&self.entity, ControlState::Running, None)
                        .await?;
                }
                _ => {}
            }

            let mut published = 0;
            let mut cycle_failed = false;
            for symbol in &symbols {
                match self.cycle_symbol(symbol).await {
                    Ok(n) => published += n,
                    Err(e) => {
                        if is_persist_error(&e) {
                            self.control
                                .write(&self.entity, ControlState::Error, Some(&e.to_string()))
                                .await?;
                            tracing::error!(symbol = %symbol, error = %e, "Fatal persistence failure");
                            return Err(e);
                        }
                        tracing::error!(symbol = %symbol, error = %e, "Producer cycle failed for {}", symbol);
                        cycle_failed = true;
                    }
                }
            }

            if cycle_failed {
                sleep(ERROR_SLEEP).await;
            } else if published == 0 {
                sleep(IDLE_SLEEP).await;
            } else {
                self.sleep_to_next_minute().await;
            }
        }
    }

    async fn sleep_to_next_minute(&self) {
        if let Some(next) = self.schedule.upcoming(Utc).next() {
            let wait = (next - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            sleep(wait).await;
        }
    }
}

/// Store write failures are the one fatal tier in the producer; everything
/// upstream or downstream of the store retries on the next cycle.
fn is_persist_error(e: &Box<dyn std::error::Error + Send + Sync>) -> bool {
    let msg = e.to_string();
    msg.contains("Failed to persist candle") || msg.contains("Store write failed")
}
