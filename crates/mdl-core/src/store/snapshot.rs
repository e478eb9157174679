//! Snapshot persistence: a single JSON table of all jobs, written atomically
//! (temp file in the same directory, then rename).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::{MutexGuard, PoisonError};
use std::time::Duration;

use super::JobStore;
use crate::error::JobError;
use crate::job::{Job, JobId, JobStatus};

const SNAPSHOT_VERSION: u8 = 1;

/// On-disk form. Unknown fields are ignored and missing ones default, so
/// older and newer snapshots both load.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default = "default_version")]
    version: u8,
    #[serde(default)]
    next_seq: u64,
    #[serde(default)]
    jobs: HashMap<JobId, Job>,
}

fn default_version() -> u8 {
    SNAPSHOT_VERSION
}

/// What `restore()` found.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RestoreSummary {
    pub restored: usize,
    /// Jobs that were running at shutdown and are now errored.
    pub supervision_lost: usize,
}

impl JobStore {
    /// Load the last snapshot. A missing snapshot yields an empty store.
    /// Jobs found running lost their process with the previous server and
    /// are reclassified as errored.
    pub fn restore(&self) -> Result<RestoreSummary, JobError> {
        let Some(path) = self.snapshot_path() else {
            return Ok(RestoreSummary::default());
        };
        let snapshot = read_snapshot(path).map_err(|e| JobError::Persistence(format!("{e:#}")))?;
        let Some(snapshot) = snapshot else {
            tracing::debug!(path = %path.display(), "no snapshot, starting empty");
            return Ok(RestoreSummary::default());
        };
        if snapshot.version > SNAPSHOT_VERSION {
            tracing::warn!(
                version = snapshot.version,
                "snapshot written by a newer version; loading known fields"
            );
        }

        let mut summary = RestoreSummary::default();
        let mut state = self.state();
        for (id, mut job) in snapshot.jobs {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Errored;
                job.error = Some(JobError::SupervisionLost.to_string());
                job.updated_at = crate::job::types::unix_timestamp();
                summary.supervision_lost += 1;
            }
            state.next_seq = state.next_seq.max(job.seq);
            state.jobs.entry(id).or_insert(job);
            summary.restored += 1;
        }
        state.next_seq = state.next_seq.max(snapshot.next_seq);
        Ok(summary)
    }

    /// Write all jobs to the snapshot file. The table is copied under the
    /// lock first, so the file reflects one point in time and never a
    /// half-applied update.
    pub fn persist(&self) -> Result<(), JobError> {
        let _writer = self.writer_lock();
        self.persist_locked()
    }

    pub(super) fn writer_lock(&self) -> MutexGuard<'_, ()> {
        self.inner
            .persist_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Body of `persist`; the caller holds `writer_lock`.
    pub(super) fn persist_locked(&self) -> Result<(), JobError> {
        let Some(path) = self.snapshot_path() else {
            return Ok(());
        };
        let snapshot = {
            let state = self.state();
            Snapshot {
                version: SNAPSHOT_VERSION,
                next_seq: state.next_seq,
                jobs: state.jobs.clone(),
            }
        };
        write_snapshot(path, &snapshot).map_err(|e| JobError::Persistence(format!("{e:#}")))?;
        tracing::debug!(path = %path.display(), jobs = snapshot.jobs.len(), "snapshot written");
        Ok(())
    }
}

/// Jobs in the snapshot at `path`, in submission order, exactly as stored.
/// Used for offline inspection; a missing file yields an empty list.
pub fn load_jobs(path: &Path) -> Result<Vec<Job>> {
    let mut jobs: Vec<Job> = read_snapshot(path)?
        .map(|s| s.jobs.into_values().collect())
        .unwrap_or_default();
    jobs.sort_by_key(|j| j.seq);
    Ok(jobs)
}

fn read_snapshot(path: &Path) -> Result<Option<Snapshot>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("read snapshot: {}", path.display())),
    };
    let snapshot = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse snapshot: {}", path.display()))?;
    Ok(Some(snapshot))
}

fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).with_context(|| format!("create dir: {}", dir.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    serde_json::to_writer_pretty(&mut tmp, snapshot).context("serialize snapshot")?;
    tmp.flush().context("flush snapshot")?;
    tmp.as_file().sync_all().context("sync snapshot")?;
    tmp.persist(path)
        .with_context(|| format!("replace snapshot: {}", path.display()))?;
    Ok(())
}

/// Persist `store` every `every`. Failures are logged and retried on the
/// next tick; they never stop the loop.
pub fn spawn_autopersist(store: JobStore, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let s = store.clone();
            match tokio::task::spawn_blocking(move || s.persist()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("periodic persist failed, retrying next cycle: {}", e),
                Err(e) => tracing::warn!("periodic persist task: {}", e),
            }
        }
    })
}
