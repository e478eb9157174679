//! Types describing a job and its lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use super::request::DownloadRequest;

/// Job identifier (UUID v4). Never reused, even after the job is cleared.
pub type JobId = String;

/// What kind of download a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Single,
    Playlist,
    Livestream,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Single => "single",
            JobKind::Playlist => "playlist",
            JobKind::Livestream => "livestream",
        }
    }
}

/// Lifecycle state of a job.
///
/// `Pending` and `Running` are transient; the rest are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Errored,
    Canceled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Errored => "errored",
            JobStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Errored | JobStatus::Canceled
        )
    }

    /// Whether `self -> next` is an edge of the job state machine.
    ///
    /// A pending job may be canceled before it starts, or errored when it can
    /// no longer be supervised; running jobs end in exactly one terminal state.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Canceled)
                | (Pending, Errored)
                | (Running, Completed)
                | (Running, Errored)
                | (Running, Canceled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured progress snapshot, refined by the worker owning the job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Progress {
    /// Percentage complete in [0, 100]. Stays 0 for livestreams.
    pub percentage: f64,
    /// Total size in bytes as reported by the tool (may be an estimate).
    pub total_bytes: Option<u64>,
    /// Transfer rate in bytes per second.
    pub speed_bps: Option<f64>,
    /// Estimated seconds remaining.
    pub eta_secs: Option<u64>,
    /// File currently being written.
    pub filename: Option<String>,
    /// 1-based index of the playlist item being downloaded.
    pub playlist_index: Option<u32>,
    pub playlist_count: Option<u32>,
}

/// One unit of work. Serialized as-is in snapshots and RPC results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub source: DownloadRequest,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: Progress,
    /// Final artifact path; set only when completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    /// Failure reason; set only when errored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    /// Submission order, used to rebuild the FIFO after a restart.
    #[serde(default)]
    pub seq: u64,
}

impl Job {
    /// Create a pending job with a fresh id.
    pub fn new(kind: JobKind, source: DownloadRequest) -> Self {
        let now = unix_timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            source,
            status: JobStatus::Pending,
            progress: Progress::default(),
            output_path: None,
            error: None,
            created_at: now,
            updated_at: now,
            seq: 0,
        }
    }
}

/// Current time as Unix seconds.
pub(crate) fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Errored.is_terminal());
        assert!(JobStatus::Canceled.is_terminal());
    }

    #[test]
    fn no_edges_out_of_terminal_states() {
        let all = [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Errored,
            JobStatus::Canceled,
        ];
        for from in all.iter().filter(|s| s.is_terminal()) {
            for to in all {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn running_is_only_entered_from_pending() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn status_serializes_lowercase() {
        let s = serde_json::to_string(&JobStatus::Canceled).unwrap();
        assert_eq!(s, "\"canceled\"");
        let k: JobKind = serde_json::from_str("\"livestream\"").unwrap();
        assert_eq!(k, JobKind::Livestream);
    }

    #[test]
    fn new_jobs_get_distinct_ids() {
        let req = DownloadRequest::for_url("https://example.com/v");
        let a = Job::new(JobKind::Single, req.clone());
        let b = Job::new(JobKind::Single, req);
        assert_ne!(a.id, b.id);
        assert_eq!(a.status, JobStatus::Pending);
        assert!(a.output_path.is_none());
    }
}
