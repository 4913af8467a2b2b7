//! Error types shared across dmcast crates.

use thiserror::Error;

/// Top-level dmcast error.
#[derive(Error, Debug)]
pub enum DmCastError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Import error: {0}")]
    Import(String),

    #[error("Slack API error: {0}")]
    Api(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Job error: {0}")]
    Job(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DmCastError>;
