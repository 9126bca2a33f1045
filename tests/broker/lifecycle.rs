//! Message lifecycle through the public broker API

use crate::common::{clocked_broker, memory_broker};
use lanequeue::queue::{BrokerConfig, FailureReason};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_groups_consume_independently() {
    let broker = memory_broker(BrokerConfig::default());
    for n in 0..3 {
        broker.publish("orders", json!({"n": n})).await.unwrap();
    }

    let billing = broker.read("orders", "billing", 10).await.unwrap();
    let audit = broker.read("orders", "audit", 2).await.unwrap();

    assert_eq!(billing.len(), 3);
    assert_eq!(audit.len(), 2);
    assert_eq!(billing[0].identifier, audit[0].identifier);
    assert_eq!(billing[2].payload, json!({"n": 2}));

    for message in &billing {
        assert!(broker.ack("orders", &message.identifier, "billing").await.unwrap());
    }
    // audit still owns its deliveries; billing acking them did not interfere
    assert!(broker.ack("orders", &audit[0].identifier, "audit").await.unwrap());

    let info = broker.info().await.unwrap();
    let stream = &info.streams[0];
    let billing_stats = stream.groups.iter().find(|g| g.name == "billing").unwrap();
    let audit_stats = stream.groups.iter().find(|g| g.name == "audit").unwrap();
    assert_eq!(billing_stats.lag, 0);
    assert_eq!(billing_stats.in_flight, 0);
    assert_eq!(audit_stats.lag, 1);
    assert_eq!(audit_stats.in_flight, 1);
}

#[tokio::test]
async fn test_ack_from_other_group_is_rejected() {
    let broker = memory_broker(BrokerConfig::default());
    let id = broker.publish("orders", json!("x")).await.unwrap();
    broker.get_next("orders", "billing").await.unwrap().unwrap();

    assert!(!broker.ack("orders", &id, "audit").await.unwrap());
    assert!(broker.ack("orders", &id, "billing").await.unwrap());
    // repeated ack is idempotent while the marker lives
    assert!(broker.ack("orders", &id, "billing").await.unwrap());
}

#[tokio::test]
async fn test_retries_then_dead_letter_then_reprocess() {
    let config = BrokerConfig {
        max_retries: 2,
        retry_delay_seconds: 1.0,
        ..BrokerConfig::default()
    };
    let (broker, clock) = clocked_broker(config);
    let id = broker.publish("orders", json!({"order": 7})).await.unwrap();

    // first delivery plus two retries
    for attempt in 0..3 {
        let message = broker.get_next("orders", "billing").await.unwrap().unwrap();
        assert_eq!(message.identifier, id, "attempt {attempt}");
        assert!(broker.nack("orders", &id, "billing").await.unwrap());
        // not yet due
        assert!(broker.get_next("orders", "billing").await.unwrap().is_none());
        clock.advance(Duration::from_secs(5));
    }

    assert!(broker.get_next("orders", "billing").await.unwrap().is_none());
    let dlq = broker.dlq_messages("orders", "billing").await.unwrap();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].identifier, id);
    assert_eq!(dlq[0].failure_reason, FailureReason::MaxRetriesExceeded);
    assert_eq!(dlq[0].payload, json!({"order": 7}));

    assert!(broker.reprocess("orders", "billing", &id).await.unwrap());
    assert!(broker.dlq_messages("orders", "billing").await.unwrap().is_empty());
    let again = broker.get_next("orders", "billing").await.unwrap().unwrap();
    assert_eq!(again.identifier, id);
    assert!(broker.ack("orders", &id, "billing").await.unwrap());

    assert!(!broker.reprocess("orders", "billing", &id).await.unwrap());
}

#[tokio::test]
async fn test_stale_delivery_is_dead_lettered_with_timeout() {
    let config = BrokerConfig {
        message_timeout: 10.0,
        ..BrokerConfig::default()
    };
    let (broker, clock) = clocked_broker(config);
    let id = broker.publish("orders", json!(1)).await.unwrap();
    broker.get_next("orders", "billing").await.unwrap().unwrap();

    clock.advance(Duration::from_secs(11));
    assert!(broker.get_next("orders", "billing").await.unwrap().is_none());

    let dlq = broker.dlq_messages("orders", "billing").await.unwrap();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].identifier, id);
    assert_eq!(dlq[0].failure_reason, FailureReason::Timeout);
    assert!(!broker.ack("orders", &id, "billing").await.unwrap());
}

#[tokio::test]
async fn test_health_counts_and_reset() {
    let broker = memory_broker(BrokerConfig::default());
    broker.publish("orders", json!(1)).await.unwrap();
    broker.publish("orders", json!(2)).await.unwrap();
    broker.get_next("orders", "billing").await.unwrap().unwrap();

    let health = broker.health().await;
    assert!(health.healthy);
    assert_eq!(health.streams, 1);
    assert_eq!(health.consumer_groups, 1);
    assert_eq!(health.message_counts.total, 2);
    assert_eq!(health.message_counts.in_flight, 1);

    broker.reset().await.unwrap();
    let health = broker.health().await;
    assert_eq!(health.streams, 0);
    assert_eq!(health.message_counts.in_flight, 0);
}
