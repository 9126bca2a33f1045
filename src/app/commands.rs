//! CLI command implementations

use crate::app::cli::display;
use crate::app::config::{AppConfig, ConfigError};
use crate::app::supervisor::ConsumerSupervisor;
use crate::consumer::{
    BatchHandler, ConsumerConfig, ConsumerError, HandlerError, LoggingHandler, PollOutcome,
    PriorityLanesConfig, StreamConsumer,
};
use crate::core::error_handling::ContextualError;
use crate::core::shutdown::ShutdownCoordinator;
use crate::queue::{Broker, BrokerConfig, BrokerError, BrokerRegistry, Message};
use crate::store::MemoryTransport;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Consumer(#[from] ConsumerError),

    #[error("Payload is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("{message}")]
    Usage { message: String },
}

impl ContextualError for CommandError {
    fn is_user_actionable(&self) -> bool {
        match self {
            CommandError::Config(e) => e.is_user_actionable(),
            CommandError::Broker(e) => e.is_user_actionable(),
            CommandError::Consumer(e) => e.is_user_actionable(),
            CommandError::Payload(_) | CommandError::Usage { .. } => true,
        }
    }

    fn user_message(&self) -> Option<String> {
        match self {
            CommandError::Config(e) => e.user_message(),
            CommandError::Broker(e) => e.user_message(),
            CommandError::Consumer(e) => e.user_message(),
            CommandError::Payload(_) | CommandError::Usage { .. } => Some(self.to_string()),
        }
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

fn print_json<T: serde::Serialize>(value: &T) -> CommandResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Returns whether the broker is healthy
pub async fn health(broker: &Broker, as_json: bool, use_color: bool) -> CommandResult<bool> {
    let health = broker.health().await;
    if as_json {
        print_json(&health)?;
    } else {
        println!("{}", display::health_report(&health, use_color));
    }
    Ok(health.healthy)
}

pub async fn info(broker: &Broker, as_json: bool, use_color: bool) -> CommandResult<()> {
    let info = broker.info().await?;
    if as_json {
        return print_json(&info);
    }
    if info.streams.is_empty() {
        eprintln!("No streams on broker '{}'.", info.broker);
        return Ok(());
    }
    display::info_table(&info, use_color).printstd();
    Ok(())
}

pub async fn publish(broker: &Broker, stream: &str, payload: &str) -> CommandResult<String> {
    let payload: Value = serde_json::from_str(payload)?;
    let id = broker.publish(stream, payload).await?;
    println!("{id}");
    Ok(id)
}

pub async fn dlq(
    broker: &Broker,
    stream: &str,
    group: &str,
    as_json: bool,
    use_color: bool,
) -> CommandResult<()> {
    let records = broker.dlq_messages(stream, group).await?;
    if as_json {
        return print_json(&records);
    }
    if records.is_empty() {
        eprintln!("No dead-lettered messages for group '{group}' on '{stream}'.");
        return Ok(());
    }
    display::dlq_table(&records, use_color).printstd();
    Ok(())
}

/// Returns whether an entry was re-injected
pub async fn reprocess(
    broker: &Broker,
    stream: &str,
    group: &str,
    identifier: &str,
) -> CommandResult<bool> {
    let found = broker.reprocess(stream, group, identifier).await?;
    if found {
        println!("Requeued {identifier} for group '{group}' on '{stream}'");
    } else {
        eprintln!("No dead-lettered message {identifier} for group '{group}' on '{stream}'");
    }
    Ok(found)
}

pub async fn reset(broker: &Broker, confirmed: bool) -> CommandResult<()> {
    if !confirmed {
        return Err(CommandError::Usage {
            message: format!(
                "Refusing to reset broker '{}' without --yes",
                broker.name()
            ),
        });
    }
    broker.reset().await?;
    println!("Broker '{}' reset", broker.name());
    Ok(())
}

/// Built-in handler registered under `name`
pub fn builtin_handler(name: &str) -> Option<Arc<dyn BatchHandler>> {
    match name {
        "log" => Some(Arc::new(LoggingHandler::default())),
        _ => None,
    }
}

/// Start every configured subscription and block until shutdown is requested
pub async fn consume(
    registry: &BrokerRegistry,
    config: &AppConfig,
    shutdown: ShutdownCoordinator,
) -> CommandResult<()> {
    if config.subscriptions.is_empty() {
        return Err(CommandError::Usage {
            message: "No [[subscriptions]] configured; nothing to consume".to_string(),
        });
    }

    let mut supervisor = ConsumerSupervisor::new(shutdown);
    for subscription in &config.subscriptions {
        let broker = registry.resolve(subscription.broker.as_deref())?;
        let handler = builtin_handler(&subscription.handler).ok_or_else(|| {
            CommandError::Usage {
                message: format!("Unknown handler '{}'", subscription.handler),
            }
        })?;
        let consumer = StreamConsumer::new(
            broker,
            handler,
            subscription.stream.clone(),
            subscription.group.clone(),
            config.consumer.clone(),
        )?;
        supervisor.spawn(consumer);
    }

    log::info!(
        "Consuming {} subscription(s); press Ctrl-C to stop",
        supervisor.len()
    );
    supervisor.run_until_shutdown().await?;
    Ok(())
}

/// Counts per lane; fails every message whose payload has `"poison": true`
#[derive(Default)]
struct DemoHandler {
    handled: Mutex<BTreeMap<String, usize>>,
}

#[async_trait]
impl BatchHandler for DemoHandler {
    fn name(&self) -> &str {
        "demo"
    }

    async fn handle(&self, stream: &str, message: &Message) -> Result<(), HandlerError> {
        if message.payload["poison"] == json!(true) {
            return Err(HandlerError::invalid_payload("poison message"));
        }
        if let Ok(mut handled) = self.handled.lock() {
            *handled.entry(stream.to_string()).or_default() += 1;
        }
        Ok(())
    }
}

/// Summary of a demo run
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DemoSummary {
    /// Batches in the order they were drained, as (lane, messages)
    pub batches: Vec<(String, usize)>,
    pub handled: BTreeMap<String, usize>,
    pub dead_lettered: usize,
}

/// Fill both lanes of an in-memory broker and drain them with one consumer
pub async fn demo(messages_per_lane: usize) -> CommandResult<DemoSummary> {
    let broker = Arc::new(Broker::new(
        "demo",
        Arc::new(MemoryTransport::new()),
        BrokerConfig {
            retry_delay_seconds: 0.0,
            ..BrokerConfig::default()
        },
    )?);
    let config = ConsumerConfig {
        batch_size: 4,
        blocking_timeout_ms: 0,
        max_retries: 1,
        priority_lanes: PriorityLanesConfig {
            enabled: true,
            ..PriorityLanesConfig::default()
        },
        ..ConsumerConfig::default()
    };
    let handler = Arc::new(DemoHandler::default());
    let mut consumer = StreamConsumer::new(
        broker.clone(),
        handler.clone(),
        "orders",
        "demo",
        config,
    )?
    .with_consumer_name("demo-1");
    consumer.initialize().await?;

    for n in 0..messages_per_lane {
        broker.publish("orders:backfill", json!({"order": n, "replayed": true})).await?;
        broker.publish("orders", json!({"order": n})).await?;
    }
    broker.publish("orders:backfill", json!({"poison": true})).await?;

    let mut summary = DemoSummary::default();
    loop {
        match consumer.poll_once().await {
            PollOutcome::Primary(o) => summary
                .batches
                .push(("orders".to_string(), o.processed + o.failed)),
            PollOutcome::Backfill(o) => summary
                .batches
                .push(("orders:backfill".to_string(), o.processed + o.failed)),
            PollOutcome::Idle => break,
            PollOutcome::ReadFailed | PollOutcome::DispatchFailed => {
                return Err(CommandError::Usage {
                    message: "demo consumer failed; see log".to_string(),
                })
            }
        }
    }

    summary.handled = handler
        .handled
        .lock()
        .map(|h| h.clone())
        .unwrap_or_default();
    summary.dead_lettered = broker
        .read("orders:backfill:dlq", "demo-inspect", usize::MAX)
        .await?
        .len();

    for (lane, count) in &summary.batches {
        println!("batch of {count:>2} from {lane}");
    }
    for (lane, count) in &summary.handled {
        println!("{lane}: {count} handled");
    }
    println!("orders:backfill:dlq: {} dead-lettered", summary.dead_lettered);
    Ok(summary)
}
