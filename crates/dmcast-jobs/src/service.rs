//! Service facade — the logical operations the invoking layer (CLI, web
//! handler) calls: submit, status, cancel, preview, parse-mentions, import.
//!
//! Validation errors reject the operation synchronously; everything that can
//! go wrong per recipient is reported through job state instead.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use dmcast_core::config::DmCastConfig;
use dmcast_core::error::{DmCastError, Result};
use dmcast_core::importer::{self, ImportRecord};
use dmcast_core::template;
use dmcast_core::types::{Recipient, UserVariables};
use dmcast_slack::SlackClient;
use serde::Serialize;
use tokio::sync::watch;

use crate::controller::{BatchRun, run_job};
use crate::job::Job;
use crate::store::JobStore;

/// Per-recipient previews plus the aggregate variable picture.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewOutcome {
    pub rendered_messages: std::collections::HashMap<String, String>,
    pub missing_variables: Vec<String>,
    pub available_variables: Vec<String>,
}

/// Parsed upload, ready for directory resolution.
#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub imported_count: usize,
    pub records: Vec<ImportRecord>,
    pub errors: Vec<String>,
}

/// The batch-send service. Owns the job registry; each submission gets its
/// own background worker and its own Slack client (and thus rate gate).
pub struct SendService {
    store: Arc<JobStore>,
    config: DmCastConfig,
}

impl SendService {
    pub fn new(config: DmCastConfig) -> Self {
        Self {
            store: Arc::new(JobStore::new(config.jobs.retention_hours)),
            config,
        }
    }

    /// Build a Slack client for one credential, using the service's pacing
    /// and retry settings.
    pub fn client_for(&self, token: &str) -> Arc<SlackClient> {
        Arc::new(SlackClient::new(token, &self.config.slack))
    }

    /// Validate and accept a batch send. Returns the pending job snapshot
    /// immediately; processing continues in a background worker.
    pub async fn submit(
        &self,
        template: &str,
        recipients: Vec<Recipient>,
        variables: UserVariables,
        client: Arc<SlackClient>,
    ) -> Result<Job> {
        if !client.validate_token().await {
            return Err(DmCastError::AuthFailed("Invalid Slack token".to_string()));
        }

        let validation_errors = template::validate(template);
        if !validation_errors.is_empty() {
            return Err(DmCastError::Template(format!(
                "Template validation failed: {}",
                validation_errors.join(", ")
            )));
        }
        if recipients.is_empty() {
            return Err(DmCastError::Job(
                "At least one recipient is required".to_string(),
            ));
        }

        let job = Job::new(recipients.len());
        let (tx, rx) = watch::channel(job.clone());
        let cancel = Arc::new(AtomicBool::new(false));
        self.store.insert(&job.job_id, rx, cancel.clone());

        let run = BatchRun {
            template: template.to_string(),
            recipients,
            variables,
        };
        tokio::spawn(run_job(job.clone(), run, client, cancel, tx));

        tracing::info!(
            "Started send job {} for {} users",
            job.job_id,
            job.total_users
        );
        Ok(job)
    }

    /// Latest snapshot for a job id.
    pub fn status(&self, job_id: &str) -> Option<Job> {
        self.store.get(job_id)
    }

    /// Request cancellation; takes effect between recipients.
    pub fn cancel(&self, job_id: &str) -> bool {
        self.store.cancel(job_id)
    }

    /// Render a template for every recipient's variables without sending.
    pub fn preview(&self, template: &str, user_data: &UserVariables) -> Result<PreviewOutcome> {
        let validation_errors = template::validate(template);
        if !validation_errors.is_empty() {
            return Err(DmCastError::Template(format!(
                "Template validation failed: {}",
                validation_errors.join(", ")
            )));
        }

        let available_variables = template::extract_placeholders(template);
        let mut rendered_messages = std::collections::HashMap::new();
        let mut missing_variables: Vec<String> = Vec::new();

        for (user_id, variables) in user_data {
            let outcome = template::render(template, variables);
            for name in &outcome.missing_variables {
                if !missing_variables.contains(name) {
                    missing_variables.push(name.clone());
                }
            }
            rendered_messages.insert(user_id.clone(), outcome.rendered);
        }

        Ok(PreviewOutcome {
            rendered_messages,
            missing_variables,
            available_variables,
        })
    }

    /// Extract `@mentions` from free text and resolve them against the
    /// directory. The credential is checked first.
    pub async fn parse_mentions(
        &self,
        text: &str,
        client: &SlackClient,
    ) -> Result<(Vec<Recipient>, Vec<String>)> {
        if !client.validate_token().await {
            return Err(DmCastError::AuthFailed("Invalid Slack token".to_string()));
        }

        let mentions = importer::extract_mentions(text);
        tracing::info!("Extracted mentions: {mentions:?}");
        Ok(client.resolve_mentions(&mentions).await)
    }

    /// Decode, size-check, and parse an uploaded variables file.
    pub fn import(&self, bytes: &[u8], filename: &str) -> Result<ImportOutcome> {
        if bytes.len() > self.config.upload.max_file_size {
            return Err(DmCastError::Import(format!(
                "File too large. Max size: {} bytes",
                self.config.upload.max_file_size
            )));
        }

        let text = std::str::from_utf8(bytes)
            .map_err(|_| DmCastError::Import("File is not valid UTF-8".to_string()))?;
        let format = importer::detect_format(text, filename)?;
        let (records, errors) = importer::parse(text, format);

        if !errors.is_empty() {
            tracing::warn!("Import errors: {errors:?}");
        }

        Ok(ImportOutcome {
            imported_count: records.len(),
            records,
            errors,
        })
    }
}
