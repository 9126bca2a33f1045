//! Command-line arguments
//!
//! Global flags override the `[logging]` table of the configuration file.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "lanequeue")]
#[command(about = "Manual message broker with priority-lane consumers")]
#[command(version, long_version = crate::core::version::long_version())]
#[command(styles = crate::core::styles::clap_styles(true))]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config-file", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Log level
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error", "off"])]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(short = 'o', long = "log-format", value_name = "FORMAT", value_parser = ["text", "ext", "json"])]
    pub log_format: Option<String>,

    /// Log file path (use 'none' to disable file logging)
    #[arg(short = 'f', long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Color output control; unspecified means auto
    #[arg(short = 'g', long = "color", value_name = "BOOL")]
    pub color: Option<bool>,

    /// Broker to operate on (defaults to the configured default broker)
    #[arg(short = 'b', long = "broker", value_name = "NAME")]
    pub broker: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Report broker health
    Health {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show streams and consumer groups
    Info {
        #[arg(long)]
        json: bool,
    },
    /// Publish a JSON payload to a stream
    Publish {
        stream: String,
        /// Payload as a JSON document
        payload: String,
    },
    /// List dead-lettered messages of a consumer group
    Dlq {
        stream: String,
        group: String,
        #[arg(long)]
        json: bool,
    },
    /// Re-inject a dead-lettered message in front of its group
    Reprocess {
        stream: String,
        group: String,
        identifier: String,
    },
    /// Delete all broker state
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
    /// Run the configured subscriptions until interrupted
    Consume,
    /// Publish sample traffic to an in-memory broker and consume it with priority lanes
    Demo {
        /// Messages per lane
        #[arg(long, default_value_t = 5)]
        messages: usize,
    },
}

impl Args {
    /// Log level from the command line, then the config file, then `info`
    pub fn effective_log_level(&self, configured: Option<&str>) -> String {
        self.log_level
            .as_deref()
            .or(configured)
            .unwrap_or("info")
            .to_string()
    }
}
