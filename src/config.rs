//! Environment-based configuration
//!
//! Every process reads its configuration from the environment at startup
//! (binaries load `.env` via dotenvy first). Required resources fail loudly
//! at construction time; there are no silent no-op fallbacks.

use std::env;
use std::path::PathBuf;

/// Deployment environment ("production" | "sandbox" | ...)
pub fn get_environment() -> String {
    env::var("ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string())
}

/// Redis connection URL (control plane, candle stream, dispatch queue)
pub fn get_redis_url() -> String {
    env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/".to_string())
}

/// Document store connection string (tokio-postgres format)
pub fn get_store_url() -> String {
    env::var("STORE_URL").unwrap_or_else(|_| {
        "host=localhost port=8812 user=admin password=quest dbname=qdb".to_string()
    })
}

/// Base URL of the inference service
pub fn get_inference_url() -> String {
    env::var("INFERENCE_URL").unwrap_or_else(|_| "http://inference-ml:8000".to_string())
}

/// Base URL of the upstream market data API
pub fn get_market_api_url() -> String {
    env::var("MARKET_API_URL").unwrap_or_else(|_| "https://api.binance.com".to_string())
}

/// Root of the shared data directory (candle and prediction ledgers)
pub fn get_data_path() -> PathBuf {
    PathBuf::from(env::var("DATA_PATH").unwrap_or_else(|_| "data".to_string()))
}

/// Candle ledger CSV for a symbol
pub fn price_ledger_path(symbol: &str) -> PathBuf {
    get_data_path().join("prices").join(format!("{}.csv", symbol))
}

/// Prediction ledger CSV for a (symbol, model, version)
pub fn prediction_ledger_path(symbol: &str, model: &str, version: &str) -> PathBuf {
    get_data_path()
        .join("predictions")
        .join(symbol)
        .join(model)
        .join(format!("{}.csv", version))
}

/// Directory watched by the dispatcher for job descriptor files
pub fn get_jobs_dir() -> PathBuf {
    PathBuf::from(env::var("JOBS_DIR").unwrap_or_else(|_| "jobs".to_string()))
}

/// Base directory for model version slots and the version registry
pub fn get_models_dir() -> PathBuf {
    PathBuf::from(env::var("MODELS_DIR").unwrap_or_else(|_| "models".to_string()))
}

/// Binary invoked by the dispatcher for producer jobs
pub fn get_producer_bin() -> String {
    env::var("PRODUCER_BIN").unwrap_or_else(|_| "producer".to_string())
}

/// Binary invoked by the dispatcher for consumer jobs
pub fn get_consumer_bin() -> String {
    env::var("CONSUMER_BIN").unwrap_or_else(|_| "consumer".to_string())
}

fn csv_env(key: &str, default: &str) -> Vec<String> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Symbols tracked by the pipeline
pub fn get_symbols() -> Vec<String> {
    csv_env("SYMBOLS", "BTCUSDT")
}

/// Model names with active consumers
pub fn get_models() -> Vec<String> {
    csv_env("MODELS", "lightgbm,tst")
}

/// Model versions with active consumers
pub fn get_versions() -> Vec<String> {
    csv_env("VERSIONS", "v1,v2,v3")
}

/// Cap on rows synced from the ledger into an empty store at startup
pub fn get_max_initial_sync_rows() -> usize {
    env::var("MAX_INITIAL_SYNC_ROWS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(100_000)
}
