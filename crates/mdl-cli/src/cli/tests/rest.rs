//! Tests for status and config.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use std::path::Path;

#[test]
fn cli_parse_status() {
    match parse(&["mdl", "status"]) {
        CliCommand::Status { snapshot } => assert!(snapshot.is_none()),
        _ => panic!("expected Status"),
    }
}

#[test]
fn cli_parse_status_snapshot() {
    match parse(&["mdl", "status", "--snapshot", "/tmp/session.json"]) {
        CliCommand::Status { snapshot } => {
            assert_eq!(snapshot.as_deref(), Some(Path::new("/tmp/session.json")));
        }
        _ => panic!("expected Status with --snapshot"),
    }
}

#[test]
fn cli_parse_config() {
    match parse(&["mdl", "config"]) {
        CliCommand::Config => {}
        _ => panic!("expected Config"),
    }
}

#[test]
fn cli_rejects_unknown_subcommand() {
    assert!(Cli::try_parse_from(["mdl", "add", "https://example.com/x"]).is_err());
}
