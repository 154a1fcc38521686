//! Read-only views of the back office data store.

use crate::error::{OrchestratorError, Result};
use crate::models::ServerRecord;
use async_trait::async_trait;
use std::collections::HashSet;

/// Media servers by host address.
#[async_trait]
pub trait ServerDirectory: Send + Sync {
    /// Returns the record for `host`, whatever its status.
    async fn find(&self, host: &str) -> Result<Option<ServerRecord>>;
}

/// Account names that are allowed to own configuration on a server.
#[async_trait]
pub trait AccountRegistry: Send + Sync {
    async fn reseller_usernames(&self) -> Result<Vec<String>>;
    async fn streaming_logins(&self) -> Result<Vec<String>>;
}

/// Resolves `host` to an active server record or fails.
pub async fn resolve_active(directory: &dyn ServerDirectory, host: &str) -> Result<ServerRecord> {
    match directory.find(host).await? {
        Some(record) if record.is_active() => Ok(record),
        Some(record) => {
            tracing::warn!(host, status = ?record.status, "server is not active");
            Err(OrchestratorError::ServerNotFound { host: host.to_string() })
        }
        None => Err(OrchestratorError::ServerNotFound { host: host.to_string() }),
    }
}

/// Reseller usernames (blank ones ignored) plus streaming logins.
pub async fn valid_account_names(registry: &dyn AccountRegistry) -> Result<HashSet<String>> {
    let mut names: HashSet<String> = registry
        .reseller_usernames()
        .await?
        .into_iter()
        .filter(|u| !u.trim().is_empty())
        .collect();
    names.extend(registry.streaming_logins().await?);
    Ok(names)
}
