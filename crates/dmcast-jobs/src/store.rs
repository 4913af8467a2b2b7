//! In-memory job registry.
//!
//! Exactly one writer per job (its worker) publishes snapshots through a
//! watch channel; any number of status pollers read the latest snapshot.
//! Terminal jobs are swept once they outlive the retention window, so the
//! registry does not grow without bound over the process lifetime.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::watch;

use crate::job::Job;

struct JobHandle {
    rx: watch::Receiver<Job>,
    cancel: Arc<AtomicBool>,
}

/// Registry of all jobs submitted to this process, by job id.
pub struct JobStore {
    jobs: RwLock<HashMap<String, JobHandle>>,
    retention: chrono::Duration,
}

impl JobStore {
    /// `retention_hours` bounds how long terminal jobs stay pollable.
    pub fn new(retention_hours: u64) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            retention: chrono::Duration::hours(retention_hours as i64),
        }
    }

    /// Register a job's snapshot channel and cancel flag. Runs the retention
    /// sweep first, so the registry is pruned on every submission.
    pub fn insert(&self, job_id: &str, rx: watch::Receiver<Job>, cancel: Arc<AtomicBool>) {
        self.sweep();
        let mut jobs = self.jobs.write().expect("job registry poisoned");
        jobs.insert(job_id.to_string(), JobHandle { rx, cancel });
    }

    /// Latest snapshot for a job, or `None` if unknown (or already swept).
    pub fn get(&self, job_id: &str) -> Option<Job> {
        let jobs = self.jobs.read().expect("job registry poisoned");
        jobs.get(job_id).map(|handle| handle.rx.borrow().clone())
    }

    /// Flag a job for cancellation; the worker checks between recipients.
    /// Returns false for unknown job ids.
    pub fn cancel(&self, job_id: &str) -> bool {
        let jobs = self.jobs.read().expect("job registry poisoned");
        match jobs.get(job_id) {
            Some(handle) => {
                handle.cancel.store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.read().expect("job registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop terminal jobs whose completion is older than the retention window.
    fn sweep(&self) {
        let cutoff = Utc::now() - self.retention;
        let mut jobs = self.jobs.write().expect("job registry poisoned");
        jobs.retain(|_, handle| {
            let job = handle.rx.borrow();
            !(job.status.is_terminal() && job.completed_at.is_some_and(|at| at < cutoff))
        });
    }
}
