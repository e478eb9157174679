//! Job Store: the authoritative id -> Job table.
//!
//! In-memory primary, guarded by a single mutex. Durable snapshots are
//! written by `persist()` (see `snapshot`) and loaded by `restore()`.
//! Dispatcher, workers and RPC handlers mutate jobs only through the
//! accessors here; nobody holds a long-lived reference to a job.

mod snapshot;

pub use snapshot::{load_jobs, spawn_autopersist, RestoreSummary};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use crate::error::JobError;
use crate::job::{Job, JobId, JobStatus, Progress};

const EVENT_CAPACITY: usize = 256;

/// Terminal and start transitions a job can take. Each variant carries the
/// only fields that may change with it, so `output_path` is set only on
/// completion and `error` only on failure.
#[derive(Debug, Clone)]
pub enum Transition {
    Start,
    Complete { output_path: String },
    Fail { reason: String },
    Cancel,
}

impl Transition {
    fn target(&self) -> JobStatus {
        match self {
            Transition::Start => JobStatus::Running,
            Transition::Complete { .. } => JobStatus::Completed,
            Transition::Fail { .. } => JobStatus::Errored,
            Transition::Cancel => JobStatus::Canceled,
        }
    }
}

#[derive(Default)]
pub(crate) struct State {
    pub(crate) jobs: HashMap<JobId, Job>,
    pub(crate) next_seq: u64,
}

struct Inner {
    state: Mutex<State>,
    snapshot_path: Option<PathBuf>,
    /// Serializes snapshot writers so an older copy never replaces a newer one.
    persist_lock: Mutex<()>,
    /// A background persist is queued and has not started copying yet.
    persist_queued: AtomicBool,
    events: broadcast::Sender<Job>,
}

/// Shared handle to the job table. Cheap to clone.
#[derive(Clone)]
pub struct JobStore {
    inner: Arc<Inner>,
}

impl JobStore {
    /// Store backed by a snapshot file. Call `restore()` before use.
    pub fn new(snapshot_path: Option<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                snapshot_path,
                persist_lock: Mutex::new(()),
                persist_queued: AtomicBool::new(false),
                events,
            }),
        }
    }

    /// Store without durable storage; `persist()` is a no-op.
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    pub fn snapshot_path(&self) -> Option<&std::path::Path> {
        self.inner.snapshot_path.as_deref()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receive a copy of every job whose status changes.
    pub fn subscribe(&self) -> broadcast::Receiver<Job> {
        self.inner.events.subscribe()
    }

    fn notify(&self, job: &Job) {
        // No subscribers is fine.
        let _ = self.inner.events.send(job.clone());
    }

    /// Insert or replace a job. New jobs get the next submission number.
    pub fn put(&self, mut job: Job) -> Job {
        let stored = {
            let mut state = self.state();
            if job.seq == 0 {
                state.next_seq += 1;
                job.seq = state.next_seq;
            }
            state.jobs.insert(job.id.clone(), job.clone());
            job
        };
        self.notify(&stored);
        stored
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        self.state().jobs.get(id).cloned()
    }

    /// Copies of all jobs matching `pred`, in submission order.
    pub fn list(&self, pred: impl Fn(&Job) -> bool) -> Vec<Job> {
        let mut out: Vec<Job> = self
            .state()
            .jobs
            .values()
            .filter(|j| pred(j))
            .cloned()
            .collect();
        out.sort_by_key(|j| j.seq);
        out
    }

    pub fn delete(&self, id: &str) -> Option<Job> {
        self.state().jobs.remove(id)
    }

    pub fn len(&self) -> usize {
        self.state().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write a snapshot off the async executor. Requests made while one is
    /// already queued are folded into it, since the queued write copies the
    /// table only once it holds the writer lock. Errors are logged only; the
    /// periodic persist retries them. Returns whether a write was queued.
    pub fn persist_in_background(&self) -> bool {
        if self.snapshot_path().is_none() {
            return false;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return false;
        };
        if self.inner.persist_queued.swap(true, Ordering::AcqRel) {
            return false;
        }
        let store = self.clone();
        handle.spawn_blocking(move || {
            let _writer = store.writer_lock();
            store.inner.persist_queued.store(false, Ordering::Release);
            if let Err(e) = store.persist_locked() {
                tracing::warn!("persist failed: {}", e);
            }
        });
        true
    }

    /// Move a job along the state machine. Fails with `InvalidState` when the
    /// edge does not exist (including any move out of a terminal state).
    pub fn transition(&self, id: &str, transition: Transition) -> Result<Job, JobError> {
        let job = {
            let mut state = self.state();
            let job = state
                .jobs
                .get_mut(id)
                .ok_or_else(|| JobError::NotFound(id.to_string()))?;
            let next = transition.target();
            if !job.status.can_transition_to(next) {
                return Err(JobError::InvalidState {
                    id: job.id.clone(),
                    status: job.status,
                });
            }
            match transition {
                Transition::Start => {}
                Transition::Complete { output_path } => {
                    job.progress.percentage = 100.0;
                    job.progress.eta_secs = Some(0);
                    job.output_path = Some(output_path);
                }
                Transition::Fail { reason } => job.error = Some(reason),
                Transition::Cancel => {}
            }
            job.status = next;
            job.updated_at = crate::job::types::unix_timestamp();
            job.clone()
        };
        tracing::debug!(job_id = %job.id, status = %job.status, "job transition");
        self.notify(&job);
        Ok(job)
    }

    /// Apply a progress snapshot to a running job. Percentage never moves
    /// backward; updates for jobs that are not running are dropped.
    /// Returns whether the update was applied.
    pub fn update_progress(&self, id: &str, progress: Progress) -> bool {
        let mut state = self.state();
        let Some(job) = state.jobs.get_mut(id) else {
            return false;
        };
        if job.status != JobStatus::Running {
            return false;
        }
        let previous = job.progress.percentage;
        job.progress = Progress {
            percentage: progress.percentage.clamp(0.0, 100.0).max(previous),
            ..progress
        };
        job.updated_at = crate::job::types::unix_timestamp();
        true
    }
}
