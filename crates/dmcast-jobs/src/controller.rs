//! The batch worker — renders and dispatches one recipient at a time,
//! publishing a fresh job snapshot after every step.
//!
//! Processing is strictly sequential within a job: it respects the client's
//! shared rate gate and keeps progress reporting simple. Per-recipient
//! failures are recorded and do not abort the job; the job completes once
//! the whole list has been iterated.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use dmcast_core::template;
use dmcast_core::types::{Recipient, UserVariables, VariableMap};
use dmcast_slack::SlackClient;
use tokio::sync::watch;

use crate::job::{Job, JobStatus, SendErrorRecord};

/// Everything a worker needs to process one batch.
pub struct BatchRun {
    pub template: String,
    pub recipients: Vec<Recipient>,
    pub variables: UserVariables,
}

/// Process a batch to completion. The worker owns the `Job` value; readers
/// only ever see the snapshots sent through `tx`.
pub async fn run_job(
    mut job: Job,
    run: BatchRun,
    client: Arc<SlackClient>,
    cancel: Arc<AtomicBool>,
    tx: watch::Sender<Job>,
) {
    job.status = JobStatus::Running;
    let _ = tx.send(job.clone());
    tracing::info!(
        target: "dmcast::send_results",
        "Starting send job {} for {} users",
        job.job_id,
        job.total_users
    );

    let empty = VariableMap::new();
    for recipient in &run.recipients {
        if cancel.load(Ordering::Relaxed) {
            let skipped = job.total_users - job.sent_count - job.failed_count;
            job.errors.push(SendErrorRecord {
                user_id: String::new(),
                user_name: String::new(),
                error: format!("Job cancelled; {skipped} recipients skipped"),
                error_code: None,
                remediation: None,
            });
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(Utc::now());
            let _ = tx.send(job.clone());
            tracing::warn!(
                target: "dmcast::send_results",
                "Cancelled send job {} after {} sends",
                job.job_id,
                job.sent_count
            );
            return;
        }

        let variables = run.variables.get(&recipient.id).unwrap_or(&empty);
        let outcome = template::render(&run.template, variables);
        if !outcome.success {
            job.failed_count += 1;
            job.errors.push(SendErrorRecord {
                user_id: recipient.id.clone(),
                user_name: recipient.display_name.clone(),
                error: format!(
                    "Template rendering failed: {}",
                    outcome.error.unwrap_or_else(|| "unknown error".into())
                ),
                error_code: None,
                remediation: None,
            });
            let _ = tx.send(job.clone());
            continue;
        }

        let result = client
            .send_dm_with_retry(&recipient.id, &outcome.rendered, None)
            .await;
        if result.success {
            job.sent_count += 1;
            tracing::info!(
                target: "dmcast::send_results",
                "Sent DM to {} ({})",
                recipient.display_name,
                recipient.id
            );
        } else {
            job.failed_count += 1;
            let error = result.error.unwrap_or_else(|| "unknown error".into());
            tracing::error!(
                target: "dmcast::send_results",
                "Failed to send DM to {} ({}): {} (code: {})",
                recipient.display_name,
                recipient.id,
                error,
                result.error_code.as_deref().unwrap_or("unknown")
            );
            job.errors.push(SendErrorRecord {
                user_id: recipient.id.clone(),
                user_name: recipient.display_name.clone(),
                error,
                error_code: result.error_code,
                remediation: result.remediation,
            });
        }
        let _ = tx.send(job.clone());
    }

    job.status = JobStatus::Completed;
    job.completed_at = Some(Utc::now());
    let _ = tx.send(job.clone());
    tracing::info!(
        target: "dmcast::send_results",
        "Completed send job {}: {} sent, {} failed",
        job.job_id,
        job.sent_count,
        job.failed_count
    );
}
