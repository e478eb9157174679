//! Job control for cancellation: one cancel token per running job.
//!
//! The dispatcher registers a token before a job starts and hands it to the
//! worker; `Cancel` requests trip the token and the worker terminates its
//! process at the next output line or exit check.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tokio_util::sync::CancellationToken;

use crate::job::JobId;

/// Shared registry of job id -> cancel token.
#[derive(Default)]
pub struct JobControl {
    jobs: RwLock<HashMap<JobId, CancellationToken>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job about to start; returns the token to pass to its worker.
    pub fn register(&self, job_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id.to_string(), token.clone());
        token
    }

    /// Unregister a job (call when the job finishes, whatever the outcome).
    pub fn unregister(&self, job_id: &str) {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(job_id);
    }

    /// Request cancellation. Returns false if the job is not registered.
    pub fn request_cancel(&self, job_id: &str) -> bool {
        match self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_id)
        {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel a job unless a cancel is already in flight. Returns whether
    /// this call tripped the token.
    pub fn cancel_fresh(&self, job_id: &str) -> bool {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        match jobs.get(job_id) {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Cancel every registered job not already canceling. Returns how many
    /// tokens this call tripped.
    pub fn cancel_all(&self) -> usize {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.values()
            .filter(|token| !token.is_cancelled())
            .map(CancellationToken::cancel)
            .count()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
