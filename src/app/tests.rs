//! Tests for configuration loading and broker wiring

use super::config::{AppConfig, ConfigError, TransportKind};
use super::startup::build_registry;
use crate::queue::DEFAULT_BROKER;
use std::io::Write;
use tempfile::NamedTempFile;

const FULL_CONFIG: &str = r#"
[logging]
level = "debug"
format = "json"

[brokers.default]
max_retries = 5
retry_delay_seconds = 0.5

[brokers.audit]
transport = "memory"
enable_dlq = false

[consumer]
batch_size = 20
priority_lanes = { enabled = true, backfill_suffix = "replay" }

[[subscriptions]]
stream = "orders"
group = "billing"

[[subscriptions]]
stream = "events"
group = "audit"
broker = "audit"
"#;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_parse_full_config() {
    let config = AppConfig::parse(FULL_CONFIG).unwrap();

    assert_eq!(config.logging.level.as_deref(), Some("debug"));
    assert_eq!(config.brokers.len(), 2);

    let default = &config.brokers["default"];
    assert_eq!(default.transport, TransportKind::Memory);
    assert_eq!(default.broker.max_retries, 5);
    assert_eq!(default.broker.retry_delay_seconds, 0.5);
    assert_eq!(default.broker.message_timeout, 300.0);
    assert!(!config.brokers["audit"].broker.enable_dlq);

    assert_eq!(config.consumer.batch_size, 20);
    assert!(config.consumer.priority_lanes.enabled);
    assert_eq!(config.consumer.backfill_stream("orders"), "orders:replay");

    assert_eq!(config.subscriptions.len(), 2);
    assert_eq!(config.subscriptions[0].handler, "log");
    assert_eq!(config.subscriptions[1].broker.as_deref(), Some("audit"));
    config.validate().unwrap();
}

#[test]
fn test_empty_config_gets_default_broker() {
    let config = AppConfig::parse("").unwrap();
    assert!(config.brokers.contains_key(DEFAULT_BROKER));
    assert!(config.subscriptions.is_empty());
    config.validate().unwrap();
}

#[test]
fn test_validate_rejects_unknown_subscription_broker() {
    let config = AppConfig::parse(
        r#"
[[subscriptions]]
stream = "orders"
group = "billing"
broker = "nowhere"
"#,
    )
    .unwrap();
    let error = config.validate().unwrap_err();
    assert!(error.to_string().contains("nowhere"));
}

#[test]
fn test_validate_rejects_unknown_handler() {
    let config = AppConfig::parse(
        r#"
[[subscriptions]]
stream = "orders"
group = "billing"
handler = "email"
"#,
    )
    .unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
}

#[test]
fn test_validate_rejects_bad_engine_settings() {
    let config = AppConfig::parse("[brokers.default]\nmessage_timeout = 0\n").unwrap();
    let error = config.validate().unwrap_err();
    assert!(error.to_string().contains("broker 'default'"));
}

#[test]
fn test_validate_rejects_reserved_backfill_suffix() {
    let config =
        AppConfig::parse("[consumer]\npriority_lanes = { enabled = true, backfill_suffix = \"dlq\" }\n")
            .unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_redis_transport_needs_url() {
    let config = AppConfig::parse("[brokers.default]\ntransport = \"redis\"\n").unwrap();
    let error = config.validate().unwrap_err();
    assert!(error.to_string().contains("redis_url"));
}

#[tokio::test]
async fn test_load_reads_explicit_file() {
    let file = write_config(FULL_CONFIG);
    let (config, path) = AppConfig::load(Some(file.path())).await.unwrap();

    assert_eq!(path.as_deref(), Some(file.path()));
    assert_eq!(config.consumer.batch_size, 20);
}

#[tokio::test]
async fn test_load_missing_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");

    let result = AppConfig::load(Some(&missing)).await;
    assert!(matches!(result, Err(ConfigError::NotFound { .. })));
}

#[tokio::test]
async fn test_load_reports_parse_errors_with_path() {
    let file = write_config("[brokers.default\nmax_retries = ");
    match AppConfig::load(Some(file.path())).await {
        Err(ConfigError::Parse { path, .. }) => assert_eq!(path, file.path()),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_build_registry_creates_configured_brokers() {
    let config = AppConfig::parse(FULL_CONFIG).unwrap();
    let registry = build_registry(&config).await.unwrap();

    assert_eq!(registry.names(), vec!["audit", "default"]);
    let default = registry.resolve(None).unwrap();
    assert_eq!(default.name(), "default");
    assert_eq!(default.config().max_retries, 5);
    assert!(!registry.get("audit").unwrap().config().enable_dlq);
}

#[tokio::test]
async fn test_build_registry_brokers_are_isolated() {
    let config = AppConfig::parse(FULL_CONFIG).unwrap();
    let registry = build_registry(&config).await.unwrap();

    let default = registry.resolve(None).unwrap();
    let audit = registry.get("audit").unwrap();
    default
        .publish("orders", serde_json::json!({"n": 1}))
        .await
        .unwrap();

    assert_eq!(default.info().await.unwrap().streams.len(), 1);
    assert!(audit.info().await.unwrap().streams.is_empty());
}

#[cfg(not(feature = "redis"))]
#[tokio::test]
async fn test_build_registry_without_redis_feature_fails() {
    let config =
        AppConfig::parse("[brokers.default]\ntransport = \"redis\"\nredis_url = \"redis://localhost\"\n")
            .unwrap();
    assert!(build_registry(&config).await.is_err());
}
