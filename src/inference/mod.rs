//! Remote inference provider
//!
//! Consumers send preprocessed feature windows to the inference service and
//! get one prediction vector back per window. Requests are chunked, retried
//! with exponential backoff, and bounded by a long timeout because cold
//! model loads can take minutes.

use crate::config;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Windows per request.
pub const INFERENCE_CHUNK: usize = 5000;
const MAX_RETRIES: usize = 3;
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Map a version slot string (`v1` | `v2` | `v3`) to the provider's
/// 0-indexed version parameter.
pub fn version_index(version: &str) -> Result<u32, Box<dyn std::error::Error + Send + Sync>> {
    let n: u32 = version
        .strip_prefix('v')
        .and_then(|v| v.parse().ok())
        .filter(|v| *v >= 1)
        .ok_or_else(|| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid model version: {}", version),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;
    Ok(n - 1)
}

#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// One prediction vector per input window, in input order.
    async fn predict(
        &self,
        windows: &[Vec<f64>],
        model: &str,
        version: &str,
    ) -> Result<Vec<Vec<f64>>, Box<dyn std::error::Error + Send + Sync>>;

    async fn is_model_available(
        &self,
        model: &str,
        version: &str,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    model: &'a str,
    version: u32,
    inputs: &'a [Vec<f64>],
}

#[derive(Deserialize)]
struct PredictResponse {
    predictions: Vec<Vec<f64>>,
}

pub struct HttpInferenceProvider {
    base_url: String,
    client: reqwest::Client,
}

impl HttpInferenceProvider {
    pub fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                Box::new(std::io::Error::other(format!(
                    "Failed to build inference HTTP client: {}",
                    e
                ))) as Box<dyn std::error::Error + Send + Sync>
            })?;
        Ok(Self::with_client(config::get_inference_url(), client))
    }

    pub fn with_client(base_url: String, client: reqwest::Client) -> Self {
        Self { base_url, client }
    }

    async fn predict_chunk(
        &self,
        windows: &[Vec<f64>],
        model: &str,
        version: u32,
    ) -> Result<Vec<Vec<f64>>, Box<dyn std::error::Error + Send + Sync>> {
        let url = format!("{}/predict", self.base_url);
        let request = PredictRequest {
            model,
            version,
            inputs: windows,
        };
        let response = self.client.post(&url).json(&request).send().await.map_err(|e| {
            Box::new(std::io::Error::other(format!(
                "Inference request failed: {}",
                e
            ))) as Box<dyn std::error::Error + Send + Sync>
        })?;
        if !response.status().is_success() {
            return Err(Box::new(std::io::Error::other(format!(
                "Inference request returned {}",
                response.status()
            ))));
        }
        let body: PredictResponse = response.json().await.map_err(|e| {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Failed to decode inference response: {}", e),
            )) as Box<dyn std::error::Error + Send + Sync>
        })?;
        if body.predictions.len() != windows.len() {
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "Inference returned {} predictions for {} windows",
                    body.predictions.len(),
                    windows.len()
                ),
            )));
        }
        Ok(body.predictions)
    }
}

#[async_trait]
impl InferenceProvider for HttpInferenceProvider {
    async fn predict(
        &self,
        windows: &[Vec<f64>],
        model: &str,
        version: &str,
    ) -> Result<Vec<Vec<f64>>, Box<dyn std::error::Error + Send + Sync>> {
        let version_idx = version_index(version)?;
        let mut predictions = Vec::with_capacity(windows.len());
        for chunk in windows.chunks(INFERENCE_CHUNK) {
            let result = (|| async { self.predict_chunk(chunk, model, version_idx).await })
                .retry(ExponentialBuilder::default().with_max_times(MAX_RETRIES))
                .notify(|err, dur| {
                    tracing::warn!(
                        error = %err,
                        retry_in_ms = dur.as_millis() as u64,
                        "Inference chunk failed, retrying"
                    );
                })
                .await?;
            predictions.extend(result);
        }
        Ok(predictions)
    }

    async fn is_model_available(
        &self,
        model: &str,
        version: &str,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let version_idx = version_index(version)?;
        let url = format!("{}/models/{}/{}", self.base_url, model, version_idx);
        let response = self.client.get(&url).send().await.map_err(|e| {
            Box::new(std::io::Error::other(format!(
                "Model availability check failed: {}",
                e
            ))) as Box<dyn std::error::Error + Send + Sync>
        })?;
        Ok(response.status().is_success())
    }
}
