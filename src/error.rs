//! Error types for remote configuration orchestration.

use thiserror::Error;

/// Failure modes of an orchestration operation.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// No active server record exists for the host.
    #[error("server not found: {host}")]
    ServerNotFound { host: String },

    /// The remote session could not be established or the command failed.
    #[error("ssh error on {host}: {reason}")]
    Transport { host: String, reason: String },

    /// The account has no configuration on the host.
    #[error("configuration not found for {name} on {host}")]
    ConfigurationNotFound { name: String, host: String },

    /// The media server did not report `active` after a restart.
    #[error("media server on {host} did not come back after restart (status: {status})")]
    ServiceNotActive { host: String, status: String },

    /// A remote check produced output outside its contract.
    #[error("unexpected output from `{command}`: {output:?}")]
    UnexpectedOutput { command: String, output: String },

    #[error("invalid account name {0:?}")]
    InvalidAccountName(String),

    #[error("publish secret must be a single line")]
    InvalidSecret,

    #[error("invalid backup path {path:?} for {name}")]
    InvalidBackupPath { name: String, path: String },

    /// The server directory or account registry failed.
    #[error("directory lookup failed: {0}")]
    Directory(String),
}

impl OrchestratorError {
    pub(crate) fn transport(host: &str, reason: impl Into<String>) -> Self {
        OrchestratorError::Transport {
            host: host.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the caller supplied bad input rather than the host misbehaving.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            OrchestratorError::InvalidAccountName(_)
                | OrchestratorError::InvalidSecret
                | OrchestratorError::InvalidBackupPath { .. }
        )
    }
}

/// Result type alias for orchestration operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
