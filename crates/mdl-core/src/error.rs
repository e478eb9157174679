//! Error taxonomy for job operations.
//!
//! Request-boundary errors (`InvalidRequest`, `NotFound`, `InvalidState`) are
//! returned synchronously to callers. Execution errors are recorded on the job
//! itself and observed by polling, so they only travel as values here.

use crate::job::{JobId, JobStatus};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobError {
    /// Missing or malformed request parameters. Never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("job {0} not found")]
    NotFound(JobId),
    /// Operation not valid for the job's current status.
    #[error("job {id} is {status}")]
    InvalidState { id: JobId, status: JobStatus },
    /// The external tool could not be started.
    #[error("failed to start tool: {0}")]
    SpawnFailure(String),
    /// The external tool exited unsuccessfully.
    #[error("{0}")]
    ExecutionFailure(String),
    #[error("supervision lost: server restarted while the job was running")]
    SupervisionLost,
    #[error("persistence: {0}")]
    Persistence(String),
}

impl JobError {
    /// Stable wire code used by the RPC layer.
    pub fn code(&self) -> &'static str {
        match self {
            JobError::InvalidRequest(_) => "InvalidRequest",
            JobError::NotFound(_) => "NotFound",
            JobError::InvalidState { .. } => "InvalidState",
            JobError::SpawnFailure(_) => "SpawnFailure",
            JobError::ExecutionFailure(_) => "ExecutionFailure",
            JobError::SupervisionLost => "SupervisionLost",
            JobError::Persistence(_) => "PersistenceFailure",
        }
    }
}
