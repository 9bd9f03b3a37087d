//! Unit tests for version slot mapping

use candlecast::inference::version_index;

#[test]
fn test_slots_map_to_zero_indexed() {
    assert_eq!(version_index("v1").unwrap(), 0);
    assert_eq!(version_index("v2").unwrap(), 1);
    assert_eq!(version_index("v3").unwrap(), 2);
}

#[test]
fn test_invalid_versions_error() {
    assert!(version_index("v0").is_err());
    assert!(version_index("1").is_err());
    assert!(version_index("latest").is_err());
    assert!(version_index("").is_err());
}
