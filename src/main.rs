//! # dmcast — Slack DM batch sender
//!
//! Sends personalized direct messages to many recipients, rendering a
//! `{placeholder}` template against per-recipient variables imported from a
//! CSV or JSON file.
//!
//! Usage:
//!   dmcast check-token --token xoxp-...
//!   dmcast mentions "@alice @bob please read" --token xoxp-...
//!   dmcast preview --template "Hi {name}!" --data users.csv
//!   dmcast send --template-file msg.txt --data users.csv --token xoxp-...

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use dmcast_core::config::DmCastConfig;
use dmcast_core::template;
use dmcast_jobs::{JobStatus, SendService};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dmcast", version, about = "Batch sender for personalized Slack DMs")]
struct Cli {
    /// Path to config file (default: ~/.dmcast/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify that a Slack token is valid
    CheckToken {
        /// Slack token (falls back to $SLACK_TOKEN)
        #[arg(long)]
        token: Option<String>,
    },
    /// Extract @mentions from text and resolve them against the workspace
    Mentions {
        text: String,
        #[arg(long)]
        token: Option<String>,
    },
    /// Render the template for every imported recipient without sending
    Preview {
        /// Template text (or use --template-file)
        #[arg(long, conflicts_with = "template_file")]
        template: Option<String>,
        #[arg(long)]
        template_file: Option<PathBuf>,
        /// CSV or JSON variables file
        #[arg(long)]
        data: PathBuf,
    },
    /// Send the rendered template to every imported recipient
    Send {
        #[arg(long, conflicts_with = "template_file")]
        template: Option<String>,
        #[arg(long)]
        template_file: Option<PathBuf>,
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        token: Option<String>,
    },
}

fn require_token(token: Option<String>) -> Result<String> {
    token
        .or_else(|| std::env::var("SLACK_TOKEN").ok())
        .context("No Slack token: pass --token or set SLACK_TOKEN")
}

fn load_template(inline: Option<String>, file: Option<PathBuf>) -> Result<String> {
    match (inline, file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read template file {}", path.display())),
        (None, None) => bail!("No template: pass --template or --template-file"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "dmcast=debug"
    } else {
        "dmcast=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => DmCastConfig::load_from(path)?,
        None => DmCastConfig::load()?,
    };
    let service = SendService::new(config);

    match cli.command {
        Command::CheckToken { token } => {
            let client = service.client_for(&require_token(token)?);
            if client.validate_token().await {
                println!("Token is valid.");
            } else {
                bail!("Token is invalid or expired");
            }
        }

        Command::Mentions { text, token } => {
            let client = service.client_for(&require_token(token)?);
            let (recipients, errors) = service.parse_mentions(&text, &client).await?;
            for recipient in &recipients {
                println!("{}\t{}\t{}", recipient.id, recipient.name, recipient.display_name);
            }
            for error in &errors {
                eprintln!("warning: {error}");
            }
        }

        Command::Preview {
            template,
            template_file,
            data,
        } => {
            let template = load_template(template, template_file)?;

            let info = template::template_info(&template);
            if !info.is_valid {
                bail!("Template invalid: {}", info.validation_errors.join("; "));
            }
            println!(
                "Template: {} chars, {} lines, variables: [{}]\n",
                info.character_count,
                info.line_count,
                info.variables.join(", ")
            );

            let bytes = std::fs::read(&data)
                .with_context(|| format!("Failed to read {}", data.display()))?;
            let filename = data.file_name().and_then(|n| n.to_str()).unwrap_or("");
            let imported = service.import(&bytes, filename)?;
            for error in &imported.errors {
                eprintln!("warning: {error}");
            }

            // Preview keys by the raw identifier; resolution happens on send.
            let user_data: dmcast_core::types::UserVariables = imported
                .records
                .iter()
                .map(|r| (r.identifier.clone(), r.variables.clone()))
                .collect();
            let preview = service.preview(&template, &user_data)?;

            for (identifier, rendered) in &preview.rendered_messages {
                println!("--- {identifier} ---\n{rendered}\n");
            }
            if !preview.missing_variables.is_empty() {
                eprintln!(
                    "warning: missing variables: {}",
                    preview.missing_variables.join(", ")
                );
            }
        }

        Command::Send {
            template,
            template_file,
            data,
            token,
        } => {
            let template = load_template(template, template_file)?;
            let client = service.client_for(&require_token(token)?);

            let bytes = std::fs::read(&data)
                .with_context(|| format!("Failed to read {}", data.display()))?;
            let filename = data.file_name().and_then(|n| n.to_str()).unwrap_or("");
            let imported = service.import(&bytes, filename)?;
            for error in &imported.errors {
                eprintln!("warning: {error}");
            }

            let (recipients, variables, errors) =
                client.resolve_records(&imported.records).await;
            for error in &errors {
                eprintln!("warning: {error}");
            }
            if recipients.is_empty() {
                bail!("No recipients resolved; nothing to send");
            }

            let job = service
                .submit(&template, recipients, variables, Arc::clone(&client))
                .await?;
            println!("Job {} started ({} recipients)", job.job_id, job.total_users);

            // Ctrl-C requests cancellation; the job still runs to a clean
            // terminal state and the summary below is printed.
            let final_job = loop {
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {}
                    _ = tokio::signal::ctrl_c() => {
                        eprintln!("Cancelling job {}...", job.job_id);
                        service.cancel(&job.job_id);
                    }
                }
                let Some(snapshot) = service.status(&job.job_id) else {
                    bail!("Job {} disappeared from the registry", job.job_id);
                };
                println!(
                    "  {}/{} sent, {} failed",
                    snapshot.sent_count, snapshot.total_users, snapshot.failed_count
                );
                if snapshot.status.is_terminal() {
                    break snapshot;
                }
            };

            println!(
                "\nJob {}: {:?} — {} sent, {} failed",
                final_job.job_id, final_job.status, final_job.sent_count, final_job.failed_count
            );
            for error in &final_job.errors {
                eprintln!("  {} ({}): {}", error.user_name, error.user_id, error.error);
                if let Some(remediation) = &error.remediation {
                    eprintln!("    -> {remediation}");
                }
            }
            if final_job.status != JobStatus::Completed {
                bail!("Job ended with status {:?}", final_job.status);
            }
        }
    }

    Ok(())
}
