//! Candle topic over Redis Streams
//!
//! One stream per symbol (`candles:{symbol}`). The producer XADDs JSON
//! batches capped at `PUBLISH_CHUNK` candles per message; each consumer
//! XREADs from its own cursor with a blocking timeout. Delivery is
//! per-message ordered and at-least-once; consumers dedup on `open_time`.

use crate::config;
use crate::models::PriceCandle;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::time::Duration;

pub const PUBLISH_CHUNK: usize = 1000;

fn topic(symbol: &str) -> String {
    format!("candles:{}", symbol.to_uppercase())
}

async fn manager(url: &str) -> Result<ConnectionManager, Box<dyn std::error::Error + Send + Sync>> {
    let client = redis::Client::open(url).map_err(|e| {
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Invalid redis URL: {}", e),
        )) as Box<dyn std::error::Error + Send + Sync>
    })?;
    ConnectionManager::new(client).await.map_err(|e| {
        Box::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            format!("Failed to connect to redis: {}", e),
        )) as Box<dyn std::error::Error + Send + Sync>
    })
}

#[derive(Clone)]
pub struct CandlePublisher {
    conn: ConnectionManager,
}

impl CandlePublisher {
    pub async fn connect() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Self::with_url(&config::get_redis_url()).await
    }

    pub async fn with_url(url: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self {
            conn: manager(url).await?,
        })
    }

    /// Publish candles to the symbol's stream, at most `PUBLISH_CHUNK` per
    /// message. Returns the number of messages written.
    pub async fn publish(
        &self,
        symbol: &str,
        candles: &[PriceCandle],
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        if candles.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let key = topic(symbol);
        let mut messages = 0;
        for chunk in candles.chunks(PUBLISH_CHUNK) {
            let payload = serde_json::to_string(chunk)?;
            redis::cmd("XADD")
                .arg(&key)
                .arg("*")
                .arg("payload")
                .arg(&payload)
                .query_async::<String>(&mut conn)
                .await
                .map_err(|e| {
                    Box::new(std::io::Error::other(format!(
                        "Failed to publish to {}: {}",
                        key, e
                    ))) as Box<dyn std::error::Error + Send + Sync>
                })?;
            messages += 1;
        }
        tracing::debug!(
            topic = %key,
            candles = candles.len(),
            messages = messages,
            "Published {} candles in {} message(s)",
            candles.len(),
            messages
        );
        Ok(messages)
    }
}

pub struct CandleSubscriber {
    conn: ConnectionManager,
    key: String,
    last_id: String,
}

impl CandleSubscriber {
    /// Subscribe at the tail of the stream: only candles published after
    /// this call are delivered. History comes from the store, not the topic.
    pub async fn subscribe(symbol: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Self::with_url(&config::get_redis_url(), symbol).await
    }

    pub async fn with_url(
        url: &str,
        symbol: &str,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self {
            conn: manager(url).await?,
            key: topic(symbol),
            last_id: "$".to_string(),
        })
    }

    /// Block up to `timeout` for the next batch. Empty vec on timeout.
    pub async fn next_batch(
        &mut self,
        timeout: Duration,
    ) -> Result<Vec<PriceCandle>, Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.conn.clone();
        let options = StreamReadOptions::default()
            .block(timeout.as_millis() as usize)
            .count(1);
        let reply: StreamReadReply = conn
            .xread_options(&[&self.key], &[&self.last_id], &options)
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to read from {}: {}",
                    self.key, e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;

        let mut candles = Vec::new();
        for stream_key in reply.keys {
            for entry in stream_key.ids {
                self.last_id = entry.id.clone();
                let Some(payload) = entry.get::<String>("payload") else {
                    tracing::warn!(topic = %self.key, id = %entry.id, "Stream entry without payload");
                    continue;
                };
                let batch: Vec<PriceCandle> = serde_json::from_str(&payload)?;
                candles.extend(batch);
            }
        }
        Ok(candles)
    }
}
