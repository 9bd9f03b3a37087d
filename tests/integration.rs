//! Integration tests - exercise the HTTP clients against mocked services

#[path = "integration/inference.rs"]
mod inference;

#[path = "integration/market.rs"]
mod market;
