//! Argument parsing for the lanequeue binary

use clap::Parser;
use lanequeue::app::cli::{Args, Command};

#[test]
fn test_broker_flag_selects_named_broker() {
    let args = Args::try_parse_from(["lanequeue", "-b", "audit", "info", "--json"]).unwrap();
    assert_eq!(args.broker.as_deref(), Some("audit"));
    assert_eq!(args.command, Command::Info { json: true });
}

#[test]
fn test_dlq_command_arguments() {
    let args = Args::try_parse_from(["lanequeue", "dlq", "orders", "billing"]).unwrap();
    assert_eq!(
        args.command,
        Command::Dlq {
            stream: "orders".to_string(),
            group: "billing".to_string(),
            json: false,
        }
    );
}

#[test]
fn test_reset_defaults_to_unconfirmed() {
    let args = Args::try_parse_from(["lanequeue", "reset"]).unwrap();
    assert_eq!(args.command, Command::Reset { yes: false });
}

#[test]
fn test_command_is_required() {
    assert!(Args::try_parse_from(["lanequeue", "-l", "debug"]).is_err());
}

#[test]
fn test_invalid_color_value_is_rejected() {
    assert!(Args::try_parse_from(["lanequeue", "--color", "sometimes", "health"]).is_err());
}
