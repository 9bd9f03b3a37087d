//! Lifecycle control plane
//!
//! Per-entity JSON records in redis under `state:{crypto}_{model}_{version}`.
//! Writes are merge-upserts; there is no locking because each key has at most
//! two writers (the orchestrator and the process itself) and last-write-wins
//! is the intended semantics.

use crate::config;
use crate::models::{ControlRecord, ControlState, EntityId};
use redis::aio::ConnectionManager;
use std::time::Duration;
use tokio::time::Instant;

const KEY_PREFIX: &str = "state:";
const READ_POLL: Duration = Duration::from_secs(1);
const WAIT_POLL: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct ControlPlane {
    conn: ConnectionManager,
}

impl ControlPlane {
    pub async fn connect() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Self::with_url(&config::get_redis_url()).await
    }

    pub async fn with_url(url: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let client = redis::Client::open(url).map_err(|e| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid redis URL: {}", e),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;
        let conn = ConnectionManager::new(client).await.map_err(|e| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("Failed to connect to redis: {}", e),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;
        Ok(Self { conn })
    }

    fn key(entity: &EntityId) -> String {
        format!("{}{}", KEY_PREFIX, entity.key())
    }

    /// Merge-upsert one entity's record. The previous `error_msg` is kept
    /// when no new error is given.
    pub async fn write(
        &self,
        entity: &EntityId,
        state: ControlState,
        error: Option<&str>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.conn.clone();
        let key = Self::key(entity);

        let mut record = match self.fetch(entity).await? {
            Some(mut existing) => {
                existing.state = state;
                if let Some(error) = error {
                    existing.error_msg = error.to_string();
                }
                existing.updated_at = chrono::Utc::now();
                existing
            }
            None => ControlRecord::new(entity, state, error),
        };
        record.crypto = entity.crypto.clone();
        record.model = entity.model.clone();
        record.version = entity.version.clone();

        let json = serde_json::to_string(&record)?;
        redis::cmd("SET")
            .arg(&key)
            .arg(&json)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to write control record {}: {}",
                    key, e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;
        tracing::debug!(entity = %entity, state = %state, "Control record written");
        Ok(())
    }

    async fn fetch(
        &self,
        entity: &EntityId,
    ) -> Result<Option<ControlRecord>, Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.conn.clone();
        let key = Self::key(entity);
        let json: Option<String> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to read control record {}: {}",
                    key, e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Current state without waiting; `Unknown` when the record is absent.
    pub async fn read_now(
        &self,
        entity: &EntityId,
    ) -> Result<ControlState, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .fetch(entity)
            .await?
            .map(|r| r.state)
            .unwrap_or(ControlState::Unknown))
    }

    /// Poll (1 s) until the record exists, up to `timeout`. Returns the
    /// parsed state once present, `Unknown` if the deadline passes first.
    pub async fn read(
        &self,
        entity: &EntityId,
        timeout: Duration,
    ) -> Result<ControlState, Box<dyn std::error::Error + Send + Sync>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(record) = self.fetch(entity).await? {
                return Ok(record.state);
            }
            if Instant::now() >= deadline {
                return Ok(ControlState::Unknown);
            }
            tokio::time::sleep(READ_POLL).await;
        }
    }

    /// Block until `predicate(state)` holds or the deadline passes. Absent
    /// records are presented to the predicate as `Unknown`.
    pub async fn wait_for(
        &self,
        entity: &EntityId,
        predicate: impl Fn(ControlState) -> bool,
        timeout: Duration,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.read_now(entity).await?;
            if predicate(state) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    entity = %entity,
                    last_state = %state,
                    "Timed out waiting for control state on {}",
                    entity
                );
                return Ok(false);
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }

    pub async fn delete(
        &self,
        entity: &EntityId,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.conn.clone();
        let key = Self::key(entity);
        redis::cmd("DEL")
            .arg(&key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to delete control record {}: {}",
                    key, e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;
        Ok(())
    }

    /// Remove every record in the `state:` namespace. Returns the count.
    pub async fn delete_all(&self) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{}*", KEY_PREFIX))
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to list control records: {}",
                    e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;
        if keys.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("DEL");
        for key in &keys {
            cmd.arg(key);
        }
        cmd.query_async::<()>(&mut conn).await.map_err(|e| {
            Box::new(std::io::Error::other(format!(
                "Failed to clear control records: {}",
                e
            ))) as Box<dyn std::error::Error + Send + Sync>
        })?;
        Ok(keys.len())
    }

    /// Every entity with a live record whose state is not yet terminal.
    pub async fn active_entities(
        &self,
    ) -> Result<Vec<EntityId>, Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{}*", KEY_PREFIX))
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to list control records: {}",
                    e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;

        let mut entities = Vec::new();
        for key in keys {
            let json: Option<String> =
                redis::cmd("GET")
                    .arg(&key)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| {
                        Box::new(std::io::Error::other(format!(
                            "Failed to read control record {}: {}",
                            key, e
                        ))) as Box<dyn std::error::Error + Send + Sync>
                    })?;
            let Some(json) = json else { continue };
            let record: ControlRecord = match serde_json::from_str(&json) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping unparseable control record");
                    continue;
                }
            };
            if !record.state.is_gone() {
                entities.push(EntityId {
                    crypto: record.crypto,
                    model: record.model,
                    version: record.version,
                });
            }
        }
        Ok(entities)
    }
}
