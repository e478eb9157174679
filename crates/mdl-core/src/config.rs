use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global configuration loaded from `~/.config/mdl/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MdlConfig {
    /// Address the HTTP server binds to.
    pub listen_addr: String,
    /// HTTP port for the RPC carriers.
    pub port: u16,
    /// Root directory the tool writes downloads into.
    pub download_dir: PathBuf,
    /// External media-retrieval tool (name on PATH or absolute path).
    pub tool_path: String,
    /// Maximum number of jobs running at once (worker slots).
    pub max_concurrent_jobs: usize,
    /// Seconds between periodic job snapshots.
    pub persist_interval_secs: u64,
    /// Bound for short-lived tool invocations such as `--version`.
    pub spawn_timeout_secs: u64,
    /// Seconds to wait after SIGTERM before killing a canceled job's process.
    pub kill_grace_secs: u64,
    /// Job snapshot file; defaults to `~/.local/state/mdl/session.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
    /// Shared secret required by the RPC gate. None leaves the gate open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_secret: Option<String>,
}

impl Default for MdlConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            port: 3033,
            download_dir: default_download_dir(),
            tool_path: "yt-dlp".to_string(),
            max_concurrent_jobs: 2,
            persist_interval_secs: 300,
            spawn_timeout_secs: 10,
            kill_grace_secs: 5,
            snapshot_path: None,
            rpc_secret: None,
        }
    }
}

impl MdlConfig {
    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(self.persist_interval_secs.max(1))
    }

    pub fn spawn_timeout(&self) -> Duration {
        Duration::from_secs(self.spawn_timeout_secs.max(1))
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }

    pub fn slots(&self) -> usize {
        self.max_concurrent_jobs.max(1)
    }

    /// Configured snapshot path, or the XDG state default.
    pub fn resolved_snapshot_path(&self) -> Result<PathBuf> {
        match &self.snapshot_path {
            Some(p) => Ok(p.clone()),
            None => default_snapshot_path(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join("Downloads"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// `$XDG_STATE_HOME/mdl/`, shared by the job snapshot and the log file.
pub fn state_dir() -> Result<PathBuf> {
    Ok(xdg::BaseDirectories::with_prefix("mdl")?.get_state_home())
}

/// Default snapshot path: `~/.local/state/mdl/session.json`.
pub fn default_snapshot_path() -> Result<PathBuf> {
    Ok(state_dir()?.join("session.json"))
}

/// Server log: `~/.local/state/mdl/mdl.log`.
pub fn default_log_path() -> Result<PathBuf> {
    Ok(state_dir()?.join("mdl.log"))
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mdl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MdlConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = MdlConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

/// Load configuration from an explicit file.
pub fn load_from_path(path: &Path) -> Result<MdlConfig> {
    let data =
        fs::read_to_string(path).with_context(|| format!("read config: {}", path.display()))?;
    let cfg: MdlConfig =
        toml::from_str(&data).with_context(|| format!("parse config: {}", path.display()))?;
    Ok(cfg)
}
