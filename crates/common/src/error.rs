//! Common error types for macdeploy.

use std::fmt;
use thiserror::Error;

/// Outcome of deleting an account after its secure token could not be granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rollback {
    /// The half-created account was removed.
    Deleted,
    /// Removal failed; an operator has to delete the account by hand.
    ManualDeletionRequired(String),
}

impl fmt::Display for Rollback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rollback::Deleted => write!(f, "account removed"),
            Rollback::ManualDeletionRequired(reason) => {
                write!(f, "manual deletion required: {}", reason)
            }
        }
    }
}

/// Common error type for macdeploy operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Command execution failed: {cmd} - {reason}{}", output_suffix(.output))]
    CommandExecution {
        cmd: String,
        reason: String,
        output: String,
    },

    #[error("Account {0} already exists")]
    AccountExists(String),

    #[error("Failed to grant secure token to {account} ({rollback})")]
    SecureToken { account: String, rollback: Rollback },

    #[error("Status query returned no output: {0}")]
    StatusUnavailable(String),

    #[error("Collector unreachable: {0}")]
    Unreachable(String),

    #[error("Collector rejected payload: {0}")]
    Rejected(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Cleanup refused: {0}")]
    CleanupRefused(String),

    #[error("Prompt failed: {0}")]
    Prompt(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a command failure from the rendered command and its output.
    pub fn command(
        cmd: impl Into<String>,
        reason: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Error::CommandExecution {
            cmd: cmd.into(),
            reason: reason.into(),
            output: output.into(),
        }
    }
}

/// Result type alias using common Error.
pub type Result<T> = std::result::Result<T, Error>;

fn output_suffix(output: &str) -> String {
    let output = output.trim();
    if output.is_empty() {
        String::new()
    } else {
        format!(": {}", output)
    }
}
