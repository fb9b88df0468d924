//! Tests for loading cache configuration.

use std::time::Duration;

use fresco::offload::TimeoutPolicy;
use fresco::{CacheConfig, CachePolicy, ConfigError, SuggestionLimit};
use pretty_assertions::assert_eq;

#[test]
fn test_full_document() {
    let yaml = r#"
policy:
  stale_time: 30s
  cache_time: 5m
sweep_interval: 90s
fetch_timeout: 10s
offload:
  timeout_policy:
    warn: 2s
suggestions:
  limit: 5
"#;
    let config = CacheConfig::from_yaml(yaml).expect("failed to load config");

    assert_eq!(
        config.policy,
        CachePolicy::new(Duration::from_secs(30), Duration::from_secs(300)).unwrap()
    );
    assert_eq!(config.sweep_interval, Duration::from_secs(90));
    assert_eq!(config.fetch_timeout, Some(Duration::from_secs(10)));
    assert_eq!(
        config.offload.timeout_policy,
        TimeoutPolicy::Warn(Duration::from_secs(2))
    );
    assert_eq!(config.suggestions.limit, SuggestionLimit::new(5).unwrap());
}

#[test]
fn test_missing_sections_use_defaults() {
    let config =
        CacheConfig::from_yaml("policy:\n  stale_time: 100ms\n").expect("failed to load config");

    assert_eq!(config.policy.stale_time(), Duration::from_millis(100));
    assert_eq!(config.policy.cache_time(), Duration::from_secs(5 * 60));
    assert_eq!(config.sweep_interval, Duration::from_secs(60));
    assert_eq!(config.fetch_timeout, None);
    assert_eq!(config.offload.timeout_policy, TimeoutPolicy::None);
    assert_eq!(config.suggestions.limit.get(), 8);
}

#[test]
fn test_empty_document_is_default() {
    let config = CacheConfig::from_yaml("{}").expect("failed to load config");
    assert_eq!(config, CacheConfig::default());
}

#[test]
fn test_inverted_policy_is_rejected() {
    let yaml = "policy:\n  stale_time: 10m\n  cache_time: 1m\n";
    let err = CacheConfig::from_yaml(yaml).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)), "unexpected error: {err:?}");
}

#[test]
fn test_suggestion_limit_out_of_range_is_rejected() {
    let err = CacheConfig::from_yaml("suggestions:\n  limit: 0\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)), "unexpected error: {err:?}");
}

#[test]
fn test_zero_sweep_interval_is_rejected() {
    let err = CacheConfig::from_yaml("sweep_interval: 0s\n").unwrap_err();
    assert_eq!(err, ConfigError::ZeroSweepInterval);
}

#[test]
fn test_round_trip_through_yaml() {
    let config = CacheConfig::builder()
        .stale_time(Duration::from_secs(1))
        .cache_time(Duration::from_secs(10))
        .fetch_timeout(Duration::from_millis(500))
        .timeout_policy(TimeoutPolicy::Warn(Duration::from_secs(3)))
        .build()
        .unwrap();

    let yaml = serde_saphyr::to_string(&config).expect("failed to serialize");
    let deserialized = CacheConfig::from_yaml(&yaml).expect("failed to deserialize");
    assert_eq!(config, deserialized);
}
