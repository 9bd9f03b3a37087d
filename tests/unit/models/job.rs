//! Unit tests for launch job descriptors

use candlecast::models::{JobDescriptor, ProcessKind};

#[test]
fn test_consumer_file_name_round_trip() {
    let descriptor = JobDescriptor::consumer("BTCUSDT", "lightgbm", "v2");
    let name = descriptor.file_name();
    assert_eq!(name, "BTCUSDT_lightgbm_v2.sh");

    let parsed = JobDescriptor::from_file_name(&name).unwrap();
    assert_eq!(parsed, descriptor);
    assert_eq!(parsed.kind, ProcessKind::Consumer);
}

#[test]
fn test_producer_file_name_routes_to_producer() {
    let parsed = JobDescriptor::from_file_name("ALL_producer_main.sh").unwrap();
    assert_eq!(parsed.kind, ProcessKind::Producer);
    assert_eq!(parsed, JobDescriptor::producer());
}

#[test]
fn test_non_descriptor_files_are_skipped() {
    assert!(JobDescriptor::from_file_name("README.md").is_none());
    assert!(JobDescriptor::from_file_name("BTCUSDT_lightgbm_v2.sh.swp").is_none());
    assert!(JobDescriptor::from_file_name("onlyonepart.sh").is_none());
    assert!(JobDescriptor::from_file_name("__.sh").is_none());
}

#[test]
fn test_script_body_names_the_binary_args() {
    let consumer = JobDescriptor::consumer("BTCUSDT", "tst", "v1");
    let body = consumer.script_body();
    assert!(body.starts_with("#!/bin/bash"));
    assert!(body.contains("--crypto BTCUSDT"));
    assert!(body.contains("--model tst"));
    assert!(body.contains("--version v1"));

    let producer = JobDescriptor::producer();
    assert!(producer.script_body().contains("--symbol ALL"));
}
