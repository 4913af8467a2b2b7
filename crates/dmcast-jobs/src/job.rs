//! Batch job state — progress counters, per-recipient error records, and the
//! status machine (pending → running → {completed, failed, cancelled}).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job status. Transitions are monotonic and terminal states are final.
/// `Completed` means the recipient list was fully iterated, regardless of how
/// many individual sends failed; `Failed` is reserved for a fault in the
/// controller loop itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// One per-recipient failure. Appended, never mutated or removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendErrorRecord {
    pub user_id: String,
    pub user_name: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

/// One batch-send operation and its evolving progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub total_users: usize,
    pub sent_count: usize,
    pub failed_count: usize,
    pub errors: Vec<SendErrorRecord>,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(total_users: usize) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            total_users,
            sent_count: 0,
            failed_count: 0,
            errors: Vec::new(),
            status: JobStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new(3);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.total_users, 3);
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Completed).unwrap(),
            "\"completed\""
        );
    }
}
