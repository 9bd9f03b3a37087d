//! Integration tests for the HTTP inference provider

use candlecast::inference::{HttpInferenceProvider, InferenceProvider};
use serde_json::json;
use tokio_test::assert_err;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> HttpInferenceProvider {
    HttpInferenceProvider::with_client(server.uri(), reqwest::Client::new())
}

#[tokio::test]
async fn predict_maps_version_slot_to_zero_indexed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .and(body_partial_json(json!({"model": "lightgbm", "version": 1})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "predictions": [[0.1, 0.2], [0.3, 0.4]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let windows = vec![vec![0.0; 150], vec![1.0; 150]];
    let predictions = provider(&server)
        .predict(&windows, "lightgbm", "v2")
        .await
        .unwrap();
    assert_eq!(predictions, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
}

#[tokio::test]
async fn predict_retries_transient_failures() {
    let server = MockServer::start().await;
    // Two failures, then success: stays within the three-retry budget.
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "predictions": [[0.5]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let predictions = provider(&server)
        .predict(&[vec![0.0; 150]], "tst", "v1")
        .await
        .unwrap();
    assert_eq!(predictions, vec![vec![0.5]]);
}

#[tokio::test]
async fn predict_rejects_mismatched_response_length() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "predictions": [[0.5]]
        })))
        .mount(&server)
        .await;

    let windows = vec![vec![0.0; 150], vec![1.0; 150]];
    assert_err!(provider(&server).predict(&windows, "tst", "v1").await);
}

#[tokio::test]
async fn availability_uses_zero_indexed_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models/lightgbm/0"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let available = provider(&server)
        .is_model_available("lightgbm", "v1")
        .await
        .unwrap();
    assert!(available);
}

#[tokio::test]
async fn availability_false_on_missing_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let available = provider(&server)
        .is_model_available("tst", "v3")
        .await
        .unwrap();
    assert!(!available);
}
