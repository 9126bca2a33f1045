//! Priority-lane consumers on top of the in-memory broker

use crate::common::{memory_broker, RecordingHandler};
use lanequeue::consumer::{
    ConsumerConfig, PollOutcome, PriorityLanesConfig, StreamConsumer,
};
use lanequeue::core::shutdown::ShutdownCoordinator;
use lanequeue::queue::{Broker, BrokerConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn lanes_config() -> ConsumerConfig {
    ConsumerConfig {
        batch_size: 10,
        blocking_timeout_ms: 0,
        max_retries: 0,
        priority_lanes: PriorityLanesConfig {
            enabled: true,
            ..PriorityLanesConfig::default()
        },
        ..ConsumerConfig::default()
    }
}

async fn consumer(broker: &Arc<Broker>, handler: &Arc<RecordingHandler>) -> StreamConsumer {
    let consumer = StreamConsumer::new(
        broker.clone(),
        handler.clone(),
        "orders",
        "billing",
        lanes_config(),
    )
    .unwrap()
    .with_consumer_name("billing-1");
    consumer.initialize().await.unwrap();
    consumer
}

#[tokio::test]
async fn test_primary_preempts_backfill_between_batches() {
    let broker = Arc::new(memory_broker(BrokerConfig::default()));
    let handler = Arc::new(RecordingHandler::default());
    let mut consumer = consumer(&broker, &handler).await;

    broker.publish("orders:backfill", json!({"replay": 1})).await.unwrap();
    broker.publish("orders", json!({"live": 1})).await.unwrap();

    assert!(matches!(consumer.poll_once().await, PollOutcome::Primary(_)));
    assert_eq!(consumer.active_stream(), "orders");

    assert!(matches!(consumer.poll_once().await, PollOutcome::Backfill(_)));
    assert_eq!(consumer.active_stream(), "orders:backfill");

    broker.publish("orders", json!({"live": 2})).await.unwrap();
    broker.publish("orders:backfill", json!({"replay": 2})).await.unwrap();
    assert!(matches!(consumer.poll_once().await, PollOutcome::Primary(_)));
    assert!(matches!(consumer.poll_once().await, PollOutcome::Backfill(_)));
    assert_eq!(consumer.poll_once().await, PollOutcome::Idle);

    let lanes: Vec<String> = handler.seen().into_iter().map(|(lane, _)| lane).collect();
    assert_eq!(
        lanes,
        vec!["orders", "orders:backfill", "orders", "orders:backfill"]
    );

    // every delivery was acked on the lane that produced it
    let info = broker.info().await.unwrap();
    for stream in info.streams {
        for group in stream.groups {
            assert_eq!(group.in_flight, 0, "{} / {}", stream.name, group.name);
            assert_eq!(group.lag, 0);
        }
    }
}

#[tokio::test]
async fn test_failed_backfill_message_goes_to_backfill_dlq_stream() {
    let broker = Arc::new(memory_broker(BrokerConfig::default()));
    let handler = Arc::new(RecordingHandler::default());
    let mut consumer = consumer(&broker, &handler).await;

    let id = broker
        .publish("orders:backfill", json!({"fail": true, "order": 3}))
        .await
        .unwrap();

    let outcome = consumer.poll_once().await;
    assert!(matches!(outcome, PollOutcome::Backfill(o) if o.failed == 1));
    assert_eq!(consumer.active_stream(), "orders");

    let entries = broker.read("orders:backfill:dlq", "inspect", 10).await.unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0].payload;
    assert_eq!(entry["original_id"], json!(id));
    assert_eq!(entry["original_stream"], json!("orders:backfill"));
    assert_eq!(entry["consumer_group"], json!("billing"));
    assert_eq!(entry["consumer"], json!("billing-1"));
    assert_eq!(entry["payload"]["order"], json!(3));
    assert!(entry["failed_at"].as_str().is_some());

    // the failed message was acked on the backfill lane, so nothing is redelivered
    assert_eq!(consumer.poll_once().await, PollOutcome::Idle);
    assert!(broker.read("orders:dlq", "inspect", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_run_loop_drains_lanes_until_shutdown() {
    let broker = Arc::new(memory_broker(BrokerConfig::default()));
    let handler = Arc::new(RecordingHandler::default());
    let consumer = consumer(&broker, &handler).await;

    for n in 0..3 {
        broker.publish("orders", json!({"live": n})).await.unwrap();
        broker.publish("orders:backfill", json!({"replay": n})).await.unwrap();
    }

    let shutdown = ShutdownCoordinator::new();
    let task = tokio::spawn(consumer.run(shutdown.subscribe()));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while handler.seen().len() < 6 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    shutdown.trigger_shutdown();
    task.await.unwrap().unwrap();

    let seen = handler.seen();
    assert_eq!(seen.len(), 6);
    assert!(seen[..3].iter().all(|(lane, _)| lane == "orders"));
    assert!(seen[3..].iter().all(|(lane, _)| lane == "orders:backfill"));
}
