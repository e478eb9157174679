//! Server logging: one append-only file next to the job snapshot, or stderr
//! when that file cannot be opened.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::config;

/// Worker and RPC detail at debug; everything else at info.
const DEFAULT_FILTER: &str = "info,mdl_core=debug,mdl=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Log to `~/.local/state/mdl/mdl.log`. Returns the path in use.
/// Errors leave no subscriber installed so the caller can fall back to stderr.
pub fn init_logging() -> Result<PathBuf> {
    let path = config::default_log_path()?;
    init_logging_at(&path)?;
    Ok(path)
}

/// Log to `path`, creating its directory.
pub fn init_logging_at(path: &Path) -> Result<()> {
    let file = open_log(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("install subscriber: {}", e))?;
    tracing::info!(pid = std::process::id(), "mdl logging to {}", path.display());
    Ok(())
}

fn open_log(path: &Path) -> Result<fs::File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create log dir: {}", dir.display()))?;
    }
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file: {}", path.display()))
}

/// Log to stderr only. Used when the log file is unavailable.
pub fn init_logging_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
}
