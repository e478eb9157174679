//! Production runner: spawns the tool, streams its output through the
//! progress tracker and terminates it on cancel.

use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use super::args;
use super::{JobRunner, Outcome};
use crate::config::MdlConfig;
use crate::error::JobError;
use crate::job::{Job, JobKind};
use crate::progress::ProgressTracker;
use crate::store::JobStore;

/// Runs jobs with the external media-retrieval tool.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    tool: PathBuf,
    download_dir: PathBuf,
    kill_grace: Duration,
}

impl ToolRunner {
    pub fn new(tool: impl Into<PathBuf>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            download_dir: download_dir.into(),
            kill_grace: Duration::from_secs(5),
        }
    }

    pub fn from_config(cfg: &MdlConfig) -> Self {
        Self::new(&cfg.tool_path, &cfg.download_dir).with_kill_grace(cfg.kill_grace())
    }

    /// Time between SIGTERM and SIGKILL when a job is canceled.
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    fn spawn(&self, job: &Job) -> Result<Child, JobError> {
        let mut cmd = Command::new(&self.tool);
        cmd.args(args::build_args(job.kind, &job.source, &self.download_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so post-processors die with the tool.
        #[cfg(unix)]
        cmd.process_group(0);
        cmd.spawn()
            .map_err(|e| JobError::SpawnFailure(format!("{}: {}", self.tool.display(), e)))
    }
}

#[async_trait]
impl JobRunner for ToolRunner {
    async fn run(&self, job: &Job, store: &JobStore, cancel: CancellationToken) -> Outcome {
        let out_dir = args::output_dir(&self.download_dir, &job.source);
        if let Err(e) = tokio::fs::create_dir_all(&out_dir).await {
            return Outcome::Failed(JobError::SpawnFailure(format!(
                "create {}: {}",
                out_dir.display(),
                e
            )));
        }

        let mut child = match self.spawn(job) {
            Ok(c) => c,
            Err(e) => return Outcome::Failed(e),
        };
        tracing::debug!(job_id = %job.id, pid = ?child.id(), kind = job.kind.as_str(), "tool spawned");
        let mut group = GroupGuard::new(&child);

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Outcome::Failed(JobError::SpawnFailure("output pipes unavailable".into()));
        };
        let mut out = LineReader::new(stdout);
        let mut err = LineReader::new(stderr);
        let mut tracker = ProgressTracker::new();

        let canceled = loop {
            if out.closed && err.closed {
                break false;
            }
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => break true,
                line = out.next(), if !out.closed => line,
                line = err.next(), if !err.closed => line,
            };
            if let Some(line) = line {
                if let Some(progress) = tracker.feed(&line) {
                    store.update_progress(&job.id, progress.clone());
                }
            }
        };

        let status = if canceled {
            None
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                status = child.wait() => Some(status),
            }
        };
        let Some(status) = status else {
            terminate(&mut child, self.kill_grace).await;
            group.disarm();
            return Outcome::Canceled;
        };
        group.disarm();

        match status {
            Ok(status) if status.success() => {
                let output_path = match (job.kind, tracker.output_path()) {
                    (JobKind::Single | JobKind::Livestream, Some(path)) => path.to_string(),
                    _ => out_dir.display().to_string(),
                };
                Outcome::Completed { output_path }
            }
            Ok(status) => Outcome::Failed(JobError::ExecutionFailure(failure_message(
                status, &tracker,
            ))),
            Err(e) => Outcome::Failed(JobError::ExecutionFailure(format!("wait for tool: {e}"))),
        }
    }
}

/// Reads newline-separated output, tolerating invalid UTF-8.
struct LineReader<R> {
    inner: tokio::io::Split<BufReader<R>>,
    closed: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader).split(b'\n'),
            closed: false,
        }
    }

    /// Next line, or `None` once the stream ends (then `closed` is set).
    async fn next(&mut self) -> Option<String> {
        match self.inner.next_segment().await {
            Ok(Some(bytes)) => Some(String::from_utf8_lossy(&bytes).trim_end().to_string()),
            Ok(None) => {
                self.closed = true;
                None
            }
            Err(e) => {
                tracing::debug!("tool output read error: {}", e);
                self.closed = true;
                None
            }
        }
    }
}

fn failure_message(status: ExitStatus, tracker: &ProgressTracker) -> String {
    let head = match status.code() {
        Some(code) => format!("exit status {code}"),
        None => "tool terminated by signal".to_string(),
    };
    let detail = tracker
        .diagnostics()
        .filter(|l| l.starts_with("ERROR"))
        .last()
        .or_else(|| tracker.last_diagnostic());
    match detail {
        Some(d) => format!("{head}: {d}"),
        None => head,
    }
}

/// Kills the tool's whole process group if `run` is dropped before the tool
/// exits, e.g. when the runtime shuts down. `kill_on_drop` alone reaches only
/// the direct child.
struct GroupGuard {
    #[cfg(unix)]
    pgid: Option<libc::pid_t>,
}

#[cfg(unix)]
impl GroupGuard {
    fn new(child: &Child) -> Self {
        Self {
            pgid: child.id().map(|pid| pid as libc::pid_t),
        }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

#[cfg(not(unix))]
impl GroupGuard {
    fn new(_child: &Child) -> Self {
        Self {}
    }

    fn disarm(&mut self) {}
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid.take() {
            tracing::debug!(pgid, "killing tool process group");
            let _ = unsafe { libc::kill(-pgid, libc::SIGKILL) };
        }
    }
}

/// SIGTERM the process group, wait `grace`, then kill.
async fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let pgid = -(pid as libc::pid_t);
        let _ = unsafe { libc::kill(pgid, libc::SIGTERM) };
        if tokio::time::timeout(grace, child.wait()).await.is_ok() {
            return;
        }
        let _ = unsafe { libc::kill(pgid, libc::SIGKILL) };
    }
    #[cfg(not(unix))]
    let _ = grace;
    if let Err(e) = child.kill().await {
        tracing::debug!("kill tool process: {}", e);
    }
}

/// Ask the tool for its version, bounded by `timeout`.
pub async fn tool_version(tool: impl AsRef<OsStr>, timeout: Duration) -> Result<String, JobError> {
    let tool = tool.as_ref();
    let output = Command::new(tool)
        .arg("--version")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();
    let output = tokio::time::timeout(timeout, output)
        .await
        .map_err(|_| {
            JobError::SpawnFailure(format!(
                "{} --version timed out after {:?}",
                tool.to_string_lossy(),
                timeout
            ))
        })?
        .map_err(|e| JobError::SpawnFailure(format!("{}: {}", tool.to_string_lossy(), e)))?;
    if !output.status.success() {
        return Err(JobError::ExecutionFailure(format!(
            "{} --version: {}",
            tool.to_string_lossy(),
            output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string())
}
