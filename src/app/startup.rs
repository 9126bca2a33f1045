//! Process startup: arguments, configuration, logging, broker wiring, dispatch

use super::cli::{Args, Command};
use super::commands::{self, CommandError, CommandResult};
use super::config::{AppConfig, TransportKind};
use crate::core::error_handling::{log_error_with_context, ContextualError};
use crate::core::logging::init_logging;
use crate::core::shutdown::ShutdownCoordinator;
use crate::queue::{Broker, BrokerRegistry, BrokerResult};
use crate::store::{MemoryTransport, Transport};
use clap::Parser;
use std::io::IsTerminal;
use std::sync::Arc;

/// Run the CLI and return the process exit code
pub async fn startup() -> i32 {
    let args = Args::parse();

    let (config, config_path) = match AppConfig::load(args.config_file.as_deref()).await {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{}", e.user_message().unwrap_or_else(|| e.to_string()));
            return 1;
        }
    };

    let use_color = args
        .color
        .or(config.logging.color)
        .unwrap_or_else(|| std::io::stdout().is_terminal());
    colored::control::set_override(use_color);

    let log_level = args.effective_log_level(config.logging.level.as_deref());
    let log_format = args.log_format.clone().or(config.logging.format.clone());
    let log_file = args
        .log_file
        .clone()
        .or(config.logging.file.clone())
        .map(|p| p.to_string_lossy().into_owned());
    if let Err(e) = init_logging(
        Some(&log_level),
        log_format.as_deref(),
        log_file.as_deref(),
        use_color,
    ) {
        eprintln!("Failed to initialise logging: {e}");
        return 1;
    }

    match &config_path {
        Some(path) => log::debug!("Loaded configuration from {}", path.display()),
        None => log::debug!("No configuration file; using defaults"),
    }

    let shutdown = ShutdownCoordinator::new();
    shutdown.install_signal_handlers();

    match run(&args, &config, shutdown, use_color).await {
        Ok(code) => code,
        Err(e) => {
            log_error_with_context(&e, &format!("Running '{}'", command_name(&args.command)));
            1
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Health { .. } => "health",
        Command::Info { .. } => "info",
        Command::Publish { .. } => "publish",
        Command::Dlq { .. } => "dlq",
        Command::Reprocess { .. } => "reprocess",
        Command::Reset { .. } => "reset",
        Command::Consume => "consume",
        Command::Demo { .. } => "demo",
    }
}

async fn run(
    args: &Args,
    config: &AppConfig,
    shutdown: ShutdownCoordinator,
    use_color: bool,
) -> CommandResult<i32> {
    if let Command::Demo { messages } = &args.command {
        commands::demo(*messages).await?;
        return Ok(0);
    }

    let registry = build_registry(config).await?;
    if let Command::Consume = &args.command {
        commands::consume(&registry, config, shutdown).await?;
        return Ok(0);
    }

    let broker = registry.resolve(args.broker.as_deref())?;
    let code = match &args.command {
        Command::Health { json } => {
            if commands::health(&broker, *json, use_color).await? {
                0
            } else {
                1
            }
        }
        Command::Info { json } => {
            commands::info(&broker, *json, use_color).await?;
            0
        }
        Command::Publish { stream, payload } => {
            commands::publish(&broker, stream, payload).await?;
            0
        }
        Command::Dlq {
            stream,
            group,
            json,
        } => {
            commands::dlq(&broker, stream, group, *json, use_color).await?;
            0
        }
        Command::Reprocess {
            stream,
            group,
            identifier,
        } => {
            if commands::reprocess(&broker, stream, group, identifier).await? {
                0
            } else {
                1
            }
        }
        Command::Reset { yes } => {
            commands::reset(&broker, *yes).await?;
            0
        }
        Command::Consume | Command::Demo { .. } => {
            return Err(CommandError::Usage {
                message: format!("'{}' was dispatched twice", command_name(&args.command)),
            })
        }
    };
    Ok(code)
}

/// Create one broker per `[brokers.<name>]` table
pub async fn build_registry(config: &AppConfig) -> BrokerResult<BrokerRegistry> {
    let mut registry = BrokerRegistry::new();
    for (name, settings) in &config.brokers {
        let transport: Arc<dyn Transport> = match settings.transport {
            TransportKind::Memory => Arc::new(MemoryTransport::new()),
            TransportKind::Redis => connect_redis(name, settings.redis_url.as_deref()).await?,
        };
        log::debug!("Broker '{}' uses the {} transport", name, settings.transport);
        registry.register(Broker::new(name.clone(), transport, settings.broker.clone())?);
    }
    Ok(registry)
}

#[cfg(feature = "redis")]
async fn connect_redis(name: &str, url: Option<&str>) -> BrokerResult<Arc<dyn Transport>> {
    let url = url.ok_or_else(|| crate::queue::BrokerError::Config {
        message: format!("broker '{name}' has no redis_url"),
    })?;
    Ok(Arc::new(crate::store::RedisTransport::connect(url).await?))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(name: &str, _url: Option<&str>) -> BrokerResult<Arc<dyn Transport>> {
    Err(crate::queue::BrokerError::Config {
        message: format!("broker '{name}' needs the redis transport, which this build lacks"),
    })
}
