//! Tests for the serve subcommand.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use std::path::Path;

#[test]
fn cli_parse_serve_defaults() {
    match parse(&["mdl", "serve"]) {
        CliCommand::Serve {
            config,
            port,
            download_dir,
            tool,
            jobs,
        } => {
            assert!(config.is_none());
            assert!(port.is_none());
            assert!(download_dir.is_none());
            assert!(tool.is_none());
            assert!(jobs.is_none());
        }
        _ => panic!("expected Serve"),
    }
}

#[test]
fn cli_parse_serve_overrides() {
    match parse(&[
        "mdl",
        "serve",
        "--config",
        "/etc/mdl.toml",
        "--port",
        "8080",
        "--download-dir",
        "/srv/media",
        "--tool",
        "/usr/local/bin/yt-dlp",
        "--jobs",
        "4",
    ]) {
        CliCommand::Serve {
            config,
            port,
            download_dir,
            tool,
            jobs,
        } => {
            assert_eq!(config.as_deref(), Some(Path::new("/etc/mdl.toml")));
            assert_eq!(port, Some(8080));
            assert_eq!(download_dir.as_deref(), Some(Path::new("/srv/media")));
            assert_eq!(tool.as_deref(), Some("/usr/local/bin/yt-dlp"));
            assert_eq!(jobs, Some(4));
        }
        _ => panic!("expected Serve with overrides"),
    }
}

#[test]
fn cli_parse_serve_rejects_bad_port() {
    assert!(Cli::try_parse_from(["mdl", "serve", "--port", "70000"]).is_err());
    assert!(Cli::try_parse_from(["mdl", "serve", "--jobs", "many"]).is_err());
}
