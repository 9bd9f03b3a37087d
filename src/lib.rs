//! Candlecast: streaming price ingestion and per-version inference workers
//! coordinated across process boundaries.
//!
//! The crate ships five binaries built on this library:
//! - `producer`: polls the upstream market source and publishes candles
//! - `consumer`: one process per (symbol, model, version) scoring candles
//! - `dispatcher`: watches the jobs directory and launches processes
//! - `consumer-start`: sequences producer and consumer launches at startup
//! - `kill_all`: best-effort graceful shutdown of everything

pub mod config;
pub mod consumer;
pub mod control;
pub mod db;
pub mod dispatch;
pub mod features;
pub mod inference;
pub mod logging;
pub mod market;
pub mod models;
pub mod orchestrator;
pub mod producer;
pub mod stream;
pub mod versioning;
