//! Worker: owns the external process of exactly one job.
//!
//! `JobRunner` is the seam between the dispatcher and process execution.
//! `ToolRunner` is the production runner; `execute` wraps any runner and
//! performs the job's single terminal transition.

pub mod args;
mod process;

pub use process::{tool_version, ToolRunner};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::job::{Job, JobStatus};
use crate::store::{JobStore, Transition};

/// How a job's execution ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed { output_path: String },
    /// `SpawnFailure` or `ExecutionFailure`.
    Failed(JobError),
    Canceled,
}

/// Runs one job to completion. Implementations write progress into the
/// store while running and must stop promptly once `cancel` fires.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(&self, job: &Job, store: &JobStore, cancel: CancellationToken) -> Outcome;
}

/// Run `job` (already `running`) and record its terminal state.
/// Returns the status the job ended in.
pub async fn execute(
    store: &JobStore,
    runner: &dyn JobRunner,
    job: &Job,
    cancel: CancellationToken,
) -> JobStatus {
    let outcome = runner.run(job, store, cancel).await;
    let transition = match outcome {
        Outcome::Completed { output_path } => {
            tracing::info!(job_id = %job.id, path = %output_path, "job completed");
            Transition::Complete { output_path }
        }
        Outcome::Failed(e) => {
            tracing::warn!(job_id = %job.id, code = e.code(), "job failed: {}", e);
            Transition::Fail {
                reason: e.to_string(),
            }
        }
        Outcome::Canceled => {
            tracing::info!(job_id = %job.id, "job canceled");
            Transition::Cancel
        }
    };
    match store.transition(&job.id, transition) {
        Ok(j) => j.status,
        Err(e) => {
            // Only possible if the job was cleared or finished elsewhere.
            tracing::warn!(job_id = %job.id, "terminal transition rejected: {}", e);
            store.get(&job.id).map(|j| j.status).unwrap_or(JobStatus::Errored)
        }
    }
}
