//! Dispatcher: admission control and job-to-worker handoff.
//!
//! Submissions are queued FIFO on an unbounded channel. A single consumer
//! loop takes a slot (semaphore permit) and then the next queued id, marks
//! the job running and hands it to a worker task. The permit lives as long
//! as the worker, so a finished job immediately lets the next one start.
//! The slot count is the only admission knob.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, Semaphore};

use crate::control::JobControl;
use crate::error::JobError;
use crate::job::{DownloadRequest, Job, JobId, JobKind, JobStatus};
use crate::store::{JobStore, Transition};
use crate::worker::{self, JobRunner};

struct Inner {
    store: JobStore,
    runner: Arc<dyn JobRunner>,
    control: JobControl,
    slots: Arc<Semaphore>,
    slot_count: usize,
    queue_tx: mpsc::UnboundedSender<JobId>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<JobId>>>,
}

/// Shared handle to the job queue. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Create a dispatcher with `slots` worker slots (at least 1).
    /// Pending jobs already in the store (e.g. restored from a snapshot) are
    /// queued first, in submission order.
    pub fn new(store: JobStore, runner: Arc<dyn JobRunner>, slots: usize) -> Self {
        let slot_count = slots.max(1);
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let restored = store.list(|j| j.status == JobStatus::Pending);
        if !restored.is_empty() {
            tracing::info!(count = restored.len(), "re-queued pending jobs");
        }
        for job in restored {
            // Receiver is alive: it is stored below.
            let _ = queue_tx.send(job.id);
        }
        Self {
            inner: Arc::new(Inner {
                store,
                runner,
                control: JobControl::new(),
                slots: Arc::new(Semaphore::new(slot_count)),
                slot_count,
                queue_tx,
                queue_rx: Mutex::new(Some(queue_rx)),
            }),
        }
    }

    /// Spawn the consumer loop. Calling it more than once has no effect.
    pub fn start(&self) -> Option<tokio::task::JoinHandle<()>> {
        let rx = self
            .inner
            .queue_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        let inner = Arc::clone(&self.inner);
        Some(tokio::spawn(consume(inner, rx)))
    }

    pub fn store(&self) -> &JobStore {
        &self.inner.store
    }

    /// Configured number of worker slots.
    pub fn slots(&self) -> usize {
        self.inner.slot_count
    }

    /// Create a pending job, persist it and queue it for execution.
    pub fn submit(&self, kind: JobKind, source: DownloadRequest) -> Result<JobId, JobError> {
        source.validate()?;
        if self.inner.slots.is_closed() {
            return Err(JobError::InvalidRequest(
                "server is shutting down".to_string(),
            ));
        }
        let job = self.inner.store.put(Job::new(kind, source));
        tracing::info!(job_id = %job.id, kind = kind.as_str(), url = %job.source.url, "job submitted");
        self.inner.store.persist_in_background();
        if self.inner.queue_tx.send(job.id.clone()).is_err() {
            tracing::warn!(job_id = %job.id, "queue closed; job stays pending until restart");
        }
        Ok(job.id)
    }

    pub fn submit_playlist(&self, source: DownloadRequest) -> Result<JobId, JobError> {
        self.submit(JobKind::Playlist, source)
    }

    pub fn submit_livestream(&self, source: DownloadRequest) -> Result<JobId, JobError> {
        self.submit(JobKind::Livestream, source)
    }

    /// Snapshot of all running jobs.
    pub fn running(&self) -> Vec<Job> {
        self.inner.store.list(|j| j.status == JobStatus::Running)
    }

    /// Snapshot of all jobs waiting for a slot, in queue order.
    pub fn pending(&self) -> Vec<Job> {
        self.inner.store.list(|j| j.status == JobStatus::Pending)
    }

    pub fn list_all(&self) -> Vec<Job> {
        self.inner.store.list(|_| true)
    }

    pub fn get(&self, id: &str) -> Result<Job, JobError> {
        self.inner
            .store
            .get(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// Cancel a job. A pending job is canceled without ever starting; a
    /// running job's worker is signalled to terminate its process.
    pub fn cancel(&self, id: &str) -> Result<(), JobError> {
        let job = self.get(id)?;
        match job.status {
            JobStatus::Pending => match self.inner.store.transition(id, Transition::Cancel) {
                Ok(_) => {
                    tracing::info!(job_id = %id, "pending job canceled");
                    self.inner.store.persist_in_background();
                    Ok(())
                }
                // Started between the read and the transition.
                Err(JobError::InvalidState {
                    status: JobStatus::Running,
                    ..
                }) => self.signal_running(id),
                Err(e) => Err(e),
            },
            JobStatus::Running => self.signal_running(id),
            status => Err(JobError::InvalidState {
                id: id.to_string(),
                status,
            }),
        }
    }

    fn signal_running(&self, id: &str) -> Result<(), JobError> {
        if self.inner.control.request_cancel(id) {
            tracing::info!(job_id = %id, "cancel requested");
            return Ok(());
        }
        let status = self.get(id)?.status;
        Err(JobError::InvalidState {
            id: id.to_string(),
            status,
        })
    }

    /// Cancel every pending and running job. Returns how many were affected;
    /// running jobs whose cancel is already in flight are not counted again.
    pub fn cancel_all(&self) -> usize {
        let mut n = 0;
        for job in self.pending() {
            if self.inner.store.transition(&job.id, Transition::Cancel).is_ok() {
                n += 1;
            }
        }
        // Tokens of queued jobs that lost the race above are registered but
        // never start; only running jobs count.
        for job in self.running() {
            if self.inner.control.cancel_fresh(&job.id) {
                n += 1;
            }
        }
        if n > 0 {
            self.inner.store.persist_in_background();
        }
        n
    }

    /// Remove a finished job from the store. Its id is never handed out again.
    pub fn clear(&self, id: &str) -> Result<Job, JobError> {
        let job = self.get(id)?;
        if !job.status.is_terminal() {
            return Err(JobError::InvalidState {
                id: id.to_string(),
                status: job.status,
            });
        }
        let removed = self
            .inner
            .store
            .delete(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        self.inner.store.persist_in_background();
        Ok(removed)
    }

    /// Stop admitting and starting jobs. Running jobs keep their processes
    /// until the runtime shuts down, which kills each tool's process group;
    /// queued jobs stay pending in the store.
    pub fn shutdown(&self) {
        self.inner.slots.close();
    }
}

async fn consume(inner: Arc<Inner>, mut rx: mpsc::UnboundedReceiver<JobId>) {
    loop {
        let Ok(permit) = Arc::clone(&inner.slots).acquire_owned().await else {
            break;
        };
        let Some(id) = rx.recv().await else {
            break;
        };
        if inner.slots.is_closed() {
            break;
        }
        let token = inner.control.register(&id);
        let job = match inner.store.transition(&id, Transition::Start) {
            Ok(job) => job,
            Err(e) => {
                // Canceled or cleared while queued.
                tracing::debug!(job_id = %id, "skip queued job: {}", e);
                inner.control.unregister(&id);
                continue;
            }
        };
        tracing::info!(job_id = %job.id, kind = job.kind.as_str(), "job started");
        let inner = Arc::clone(&inner);
        tokio::spawn(async move {
            let _slot = permit;
            worker::execute(&inner.store, inner.runner.as_ref(), &job, token).await;
            inner.control.unregister(&job.id);
            inner.store.persist_in_background();
        });
    }
    tracing::debug!("dispatcher consumer stopped");
}
