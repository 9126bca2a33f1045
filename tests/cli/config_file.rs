//! Configuration files driving broker and consumer setup

use lanequeue::app::commands;
use lanequeue::app::config::{AppConfig, ConfigError};
use lanequeue::app::startup::build_registry;
use serde_json::json;
use std::io::Write;
use tempfile::NamedTempFile;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_file_settings_reach_the_broker() {
    let file = config_file(
        r#"
[brokers.primary]
max_retries = 0
enable_dlq = true
"#,
    );
    let (config, _) = AppConfig::load(Some(file.path())).await.unwrap();
    let registry = build_registry(&config).await.unwrap();
    // the only broker becomes the default
    let broker = registry.resolve(None).unwrap();
    assert_eq!(broker.name(), "primary");

    let id = broker.publish("orders", json!({"n": 1})).await.unwrap();
    broker.get_next("orders", "billing").await.unwrap().unwrap();
    assert!(broker.nack("orders", &id, "billing").await.unwrap());

    let dlq = broker.dlq_messages("orders", "billing").await.unwrap();
    assert_eq!(dlq.len(), 1);
}

#[tokio::test]
async fn test_invalid_file_is_rejected_before_wiring() {
    let file = config_file(
        r#"
[consumer]
batch_size = 0
"#,
    );
    let result = AppConfig::load(Some(file.path())).await;
    assert!(matches!(result, Err(ConfigError::Invalid { .. })));
}

#[tokio::test]
async fn test_publish_command_against_configured_broker() {
    let file = config_file("");
    let (config, _) = AppConfig::load(Some(file.path())).await.unwrap();
    let registry = build_registry(&config).await.unwrap();
    let broker = registry.resolve(None).unwrap();

    let id = commands::publish(&broker, "orders", r#"{"order": 42}"#)
        .await
        .unwrap();
    let message = broker.get_next("orders", "billing").await.unwrap().unwrap();
    assert_eq!(message.identifier, id);
    assert_eq!(message.payload, json!({"order": 42}));
}

#[tokio::test]
async fn test_demo_command_runs_end_to_end() {
    let summary = commands::demo(3).await.unwrap();
    assert_eq!(summary.handled.values().sum::<usize>(), 6);
    assert_eq!(summary.dead_lettered, 1);
}
