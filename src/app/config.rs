//! TOML configuration file loading and validation
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [brokers.default]
//! transport = "memory"
//! max_retries = 5
//!
//! [consumer]
//! blocking_timeout_ms = 2000
//! priority_lanes = { enabled = true, backfill_suffix = "backfill" }
//!
//! [[subscriptions]]
//! stream = "orders"
//! group = "billing"
//! ```

use crate::consumer::ConsumerConfig;
use crate::core::error_handling::ContextualError;
use crate::queue::{BrokerConfig, DEFAULT_BROKER};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Handlers that can be named in a `[[subscriptions]]` entry
pub const BUILTIN_HANDLERS: &[&str] = &["log"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("The specified configuration file does not exist: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Error reading configuration file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error parsing configuration file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

impl ContextualError for ConfigError {
    fn is_user_actionable(&self) -> bool {
        true
    }

    fn user_message(&self) -> Option<String> {
        Some(self.to_string())
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
    pub file: Option<PathBuf>,
    pub color: Option<bool>,
}

/// One `[brokers.<name>]` table: transport selection plus engine tunables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrokerSettings {
    #[serde(default)]
    pub transport: TransportKind,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(flatten)]
    pub broker: BrokerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub stream: String,
    pub group: String,
    #[serde(default = "default_handler")]
    pub handler: String,
    /// Broker to consume from; the default broker when omitted
    #[serde(default)]
    pub broker: Option<String>,
}

fn default_handler() -> String {
    "log".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub brokers: BTreeMap<String, BrokerSettings>,
    pub consumer: ConsumerConfig,
    pub subscriptions: Vec<Subscription>,
}

impl AppConfig {
    /// Default location: `<config dir>/Lanequeue/lanequeue.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("Lanequeue").join("lanequeue.toml"))
    }

    /// Load and validate the configuration
    ///
    /// An explicitly given file must exist. Without one the default path is used when
    /// present, otherwise built-in defaults apply. Returns the file actually read.
    pub async fn load(path: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let path = match path {
            Some(path) if !path.exists() => {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|p| p.exists()),
        };

        let Some(path) = path else {
            let config = Self::default().with_default_broker();
            config.validate()?;
            return Ok((config, None));
        };

        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
        let config = Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        config.validate()?;
        Ok((config, Some(path)))
    }

    /// Parse TOML text; a missing `[brokers]` section yields one in-memory default broker
    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        let config: Self = toml::from_str(contents)?;
        Ok(config.with_default_broker())
    }

    fn with_default_broker(mut self) -> Self {
        if self.brokers.is_empty() {
            self.brokers
                .insert(DEFAULT_BROKER.to_string(), BrokerSettings::default());
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, settings) in &self.brokers {
            settings
                .broker
                .validate()
                .map_err(|e| ConfigError::invalid(format!("broker '{name}': {e}")))?;

            if settings.transport == TransportKind::Redis {
                if settings
                    .redis_url
                    .as_deref()
                    .filter(|url| !url.is_empty())
                    .is_none() {
                    return Err(ConfigError::invalid(format!(
                        "broker '{name}' uses the redis transport but has no redis_url"
                    )));
                }
                if !cfg!(feature = "redis") {
                    return Err(ConfigError::invalid(format!(
                        "broker '{name}' uses the redis transport but this build lacks the 'redis' feature"
                    )));
                }
            }
        }

        self.consumer
            .validate()
            .map_err(|e| ConfigError::invalid(e.to_string()))?;

        for subscription in &self.subscriptions {
            if subscription.stream.is_empty() || subscription.group.is_empty() {
                return Err(ConfigError::invalid(
                    "subscriptions need a non-empty stream and group",
                ));
            }
            if !BUILTIN_HANDLERS.contains(&subscription.handler.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "unknown handler '{}' for stream '{}' (available: {})",
                    subscription.handler,
                    subscription.stream,
                    BUILTIN_HANDLERS.join(", ")
                )));
            }
            if let Some(broker) = &subscription.broker {
                if !self.brokers.contains_key(broker) {
                    return Err(ConfigError::invalid(format!(
                        "subscription on '{}' refers to unknown broker '{broker}'",
                        subscription.stream
                    )));
                }
            }
        }
        Ok(())
    }
}
