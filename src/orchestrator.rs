//! Account lifecycle on remote Wowza servers.
//!
//! Each operation resolves the target server, takes the per-account lock,
//! runs its remote steps in order and restarts the media server. Nothing is
//! rolled back: a failed step leaves whatever was already applied, and
//! [`Orchestrator::sync`] / [`Orchestrator::cleanup_orphans`] converge later.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::try_join_all;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{Config, LayoutConfig};
use crate::directory::{resolve_active, valid_account_names, AccountRegistry, ServerDirectory};
use crate::documents::{
    self, AccountPaths, ConfigurationBundle, BITRATE_PROPERTIES, VIEWER_PROPERTIES,
};
use crate::error::{OrchestratorError, Result};
use crate::locks::KeyedLocks;
use crate::models::{
    validate_secret, AccountConfig, AccountName, AccountUpdate, Action, CleanupReport,
    OperationOutcome, ServerRecord, ServiceStatus,
};
use crate::remote::{RemoteExecutor, RemoteFs};
use crate::service::ServiceController;

pub struct Orchestrator {
    layout: LayoutConfig,
    executor: Arc<dyn RemoteExecutor>,
    directory: Arc<dyn ServerDirectory>,
    registry: Arc<dyn AccountRegistry>,
    service: ServiceController,
    locks: KeyedLocks,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        executor: Arc<dyn RemoteExecutor>,
        directory: Arc<dyn ServerDirectory>,
        registry: Arc<dyn AccountRegistry>,
    ) -> Self {
        Self {
            layout: config.layout.clone(),
            service: ServiceController::new(&config.layout, &config.restart),
            executor,
            directory,
            registry,
            locks: KeyedLocks::new(),
        }
    }

    fn paths(&self, name: &str) -> AccountPaths {
        AccountPaths::new(&self.layout.config_root, &self.layout.storage_root, name)
    }

    fn fs<'a>(&'a self, server: &'a ServerRecord) -> RemoteFs<'a> {
        RemoteFs::new(self.executor.as_ref(), server)
    }

    async fn server(&self, host: &str) -> Result<ServerRecord> {
        resolve_active(self.directory.as_ref(), host).await
    }

    async fn restart(&self, server: &ServerRecord) -> Result<()> {
        self.service
            .restart_and_verify(self.executor.as_ref(), server)
            .await
    }

    /// True when the account's application directory exists on the host.
    pub async fn config_exists(&self, name: &AccountName, host: &str) -> Result<bool> {
        let server = self.server(host).await?;
        let paths = self.paths(name.as_str());
        self.fs(&server).dir_exists(&paths.app_dir).await
    }

    /// Provisions the account, or updates it when it is already configured.
    pub async fn create(&self, account: &AccountConfig) -> Result<OperationOutcome> {
        let name = account.name.as_str();
        instrumented("create", name, &account.host, async {
            validate_secret(&account.publish_secret)?;
            tracing::info!(
                bitrate = account.max_bitrate_kbps,
                viewers = account.max_viewers,
                "creating configuration"
            );
            let server = self.server(&account.host).await?;
            let _guard = self.locks.lock(name, &account.host).await;

            let paths = self.paths(name);
            if self.fs(&server).dir_exists(&paths.app_dir).await? {
                tracing::info!("configuration already exists, updating instead");
                return self.update_locked(&account.name, &server, &account.as_update()).await;
            }
            self.provision_locked(account, &server, &paths).await
        })
        .await
    }

    async fn provision_locked(
        &self,
        account: &AccountConfig,
        server: &ServerRecord,
        paths: &AccountPaths,
    ) -> Result<OperationOutcome> {
        let fs = self.fs(server);
        let layout = &self.layout;

        step("create application directory", fs.ensure_directory(&paths.app_dir)).await?;

        let bundle = ConfigurationBundle::generate(account, paths, &layout.storage_root);
        step(
            "write configuration files",
            try_join_all(
                bundle
                    .documents
                    .iter()
                    .map(|doc| fs.write_file(&doc.path, &doc.content)),
            ),
        )
        .await?;

        step("create storage directory", fs.ensure_directory(&paths.storage_dir)).await?;
        step(
            "set ownership",
            fs.set_ownership(
                &layout.owner,
                &layout.group,
                &layout.mode,
                &[&paths.app_dir, &paths.storage_dir],
            ),
        )
        .await?;
        step("restart media server", self.restart(server)).await?;

        tracing::info!("configuration created");
        Ok(OperationOutcome::done(
            Action::Created,
            format!("configuration created for {}", account.name),
        ))
    }

    /// Patches limits and, when given, the publish secret of an existing account.
    pub async fn update(
        &self,
        name: &AccountName,
        host: &str,
        update: &AccountUpdate,
    ) -> Result<OperationOutcome> {
        instrumented("update", name.as_str(), host, async {
            if let Some(secret) = &update.publish_secret {
                validate_secret(secret)?;
            }
            tracing::info!(?update, "updating configuration");
            let server = self.server(host).await?;
            let _guard = self.locks.lock(name.as_str(), host).await;
            self.update_locked(name, &server, update).await
        })
        .await
    }

    async fn update_locked(
        &self,
        name: &AccountName,
        server: &ServerRecord,
        update: &AccountUpdate,
    ) -> Result<OperationOutcome> {
        let fs = self.fs(server);
        let paths = self.paths(name.as_str());
        let descriptor = paths.descriptor();

        if !fs.file_exists(&descriptor).await? {
            return Err(OrchestratorError::ConfigurationNotFound {
                name: name.to_string(),
                host: server.host_address.clone(),
            });
        }

        if update.max_bitrate_kbps.is_some() || update.max_viewers.is_some() {
            let current = fs.read_file(&descriptor).await?;
            let mut patched = current.clone();
            if let Some(bitrate) = update.max_bitrate_kbps {
                for property in BITRATE_PROPERTIES {
                    patched = patch(&patched, property, bitrate);
                }
            }
            if let Some(viewers) = update.max_viewers {
                for property in VIEWER_PROPERTIES {
                    patched = patch(&patched, property, viewers);
                }
            }
            if patched != current {
                step("write application descriptor", fs.write_file(&descriptor, &patched)).await?;
            }
        }

        if let Some(secret) = &update.publish_secret {
            let content = documents::publish_password(name.as_str(), secret);
            step("write publish password", fs.write_file(&paths.password_file(), &content)).await?;
        }

        step("restart media server", self.restart(server)).await?;

        tracing::info!("configuration updated");
        Ok(OperationOutcome::done(
            Action::Updated,
            format!("configuration updated for {name}"),
        ))
    }

    /// Rewrites the publish password file of an existing account.
    pub async fn update_password(
        &self,
        name: &AccountName,
        host: &str,
        secret: &str,
    ) -> Result<OperationOutcome> {
        instrumented("update_password", name.as_str(), host, async {
            validate_secret(secret)?;
            let server = self.server(host).await?;
            let _guard = self.locks.lock(name.as_str(), host).await;

            let fs = self.fs(&server);
            let password_file = self.paths(name.as_str()).password_file();
            if !fs.file_exists(&password_file).await? {
                return Err(OrchestratorError::ConfigurationNotFound {
                    name: name.to_string(),
                    host: host.to_string(),
                });
            }

            let content = documents::publish_password(name.as_str(), secret);
            step("write publish password", fs.write_file(&password_file, &content)).await?;
            step("restart media server", self.restart(&server)).await?;

            tracing::info!("publish password updated");
            Ok(OperationOutcome::done(
                Action::PasswordUpdated,
                format!("publish password updated for {name}"),
            ))
        })
        .await
    }

    /// Deletes the application and storage directories. Removing an account
    /// that was never provisioned succeeds.
    pub async fn remove(&self, name: &AccountName, host: &str) -> Result<OperationOutcome> {
        instrumented("remove", name.as_str(), host, async {
            let server = self.server(host).await?;
            let _guard = self.locks.lock(name.as_str(), host).await;

            let fs = self.fs(&server);
            let paths = self.paths(name.as_str());
            step("stop media server", self.service.stop(self.executor.as_ref(), &server)).await?;
            step("remove application directory", fs.remove_all(&paths.app_dir)).await?;
            step("remove storage directory", fs.remove_all(&paths.storage_dir)).await?;
            step("restart media server", self.restart(&server)).await?;

            tracing::info!("configuration removed");
            Ok(OperationOutcome::done(
                Action::Removed,
                format!("configuration removed for {name}"),
            ))
        })
        .await
    }

    /// Creates the configuration if it is missing; otherwise leaves it alone.
    pub async fn sync(&self, account: &AccountConfig) -> Result<OperationOutcome> {
        let name = account.name.as_str();
        instrumented("sync", name, &account.host, async {
            validate_secret(&account.publish_secret)?;
            let server = self.server(&account.host).await?;
            let _guard = self.locks.lock(name, &account.host).await;

            let paths = self.paths(name);
            if self.fs(&server).dir_exists(&paths.app_dir).await? {
                tracing::info!("configuration verified");
                return Ok(OperationOutcome::done(
                    Action::Verified,
                    format!("configuration verified for {name}"),
                ));
            }
            tracing::info!("configuration missing, creating");
            self.provision_locked(account, &server, &paths).await
        })
        .await
    }

    /// Copies the application directory next to itself; returns the copy's path.
    pub async fn backup(&self, name: &AccountName, host: &str) -> Result<String> {
        instrumented("backup", name.as_str(), host, async {
            let server = self.server(host).await?;
            let _guard = self.locks.lock(name.as_str(), host).await;

            let fs = self.fs(&server);
            let paths = self.paths(name.as_str());
            if !fs.dir_exists(&paths.app_dir).await? {
                return Err(OrchestratorError::ConfigurationNotFound {
                    name: name.to_string(),
                    host: host.to_string(),
                });
            }

            let backup_dir = paths.backup_dir(chrono::Utc::now().timestamp_millis());
            step("copy application directory", fs.copy_dir(&paths.app_dir, &backup_dir)).await?;
            tracing::info!(backup = %backup_dir, "backup created");
            Ok(backup_dir)
        })
        .await
    }

    /// Replaces the application directory with a backup taken by [`Self::backup`].
    pub async fn restore(
        &self,
        name: &AccountName,
        host: &str,
        backup_path: &str,
    ) -> Result<OperationOutcome> {
        instrumented("restore", name.as_str(), host, async {
            let paths = self.paths(name.as_str());
            if !is_backup_of(&paths, backup_path) {
                return Err(OrchestratorError::InvalidBackupPath {
                    name: name.to_string(),
                    path: backup_path.to_string(),
                });
            }
            let server = self.server(host).await?;
            let _guard = self.locks.lock(name.as_str(), host).await;

            let fs = self.fs(&server);
            if !fs.dir_exists(backup_path).await? {
                return Err(OrchestratorError::InvalidBackupPath {
                    name: name.to_string(),
                    path: backup_path.to_string(),
                });
            }

            step("stop media server", self.service.stop(self.executor.as_ref(), &server)).await?;
            step("remove application directory", fs.remove_all(&paths.app_dir)).await?;
            step("copy backup into place", fs.copy_dir(backup_path, &paths.app_dir)).await?;
            step("restart media server", self.restart(&server)).await?;

            tracing::info!(backup = %backup_path, "configuration restored");
            Ok(OperationOutcome::done(
                Action::Restored,
                format!("configuration restored for {name}"),
            ))
        })
        .await
    }

    pub async fn status(&self, host: &str) -> Result<ServiceStatus> {
        let server = self.server(host).await?;
        self.service.status(self.executor.as_ref(), &server).await
    }

    /// Entries of the configuration root, infrastructure files included.
    pub async fn list_configurations(&self, host: &str) -> Result<Vec<String>> {
        let server = self.server(host).await?;
        self.fs(&server).list_dir(&self.layout.config_root).await
    }

    /// Deletes configuration left behind by accounts the back office no
    /// longer knows. Failures on individual entries are logged and skipped.
    pub async fn cleanup_orphans(&self, host: &str) -> Result<CleanupReport> {
        let span = tracing::info_span!("cleanup_orphans", op = %Uuid::new_v4(), host);
        async {
            let server = self.server(host).await?;
            let fs = self.fs(&server);

            let entries = fs.list_dir(&self.layout.config_root).await?;
            let valid = valid_account_names(self.registry.as_ref()).await?;
            let mut orphans = Vec::new();
            for entry in entries {
                if self.layout.infrastructure_files.contains(&entry) || valid.contains(&entry) {
                    continue;
                }
                if !is_removable_entry(&entry) {
                    tracing::warn!(entry = %entry, "skipping entry that is not an account directory name");
                    continue;
                }
                orphans.push(entry);
            }

            if orphans.is_empty() {
                tracing::info!("no orphaned configurations");
                return Ok(CleanupReport::default());
            }
            tracing::info!(count = orphans.len(), ?orphans, "removing orphaned configurations");

            let mut removed = Vec::with_capacity(orphans.len());
            for entry in orphans {
                let _guard = self.locks.lock(&entry, host).await;
                let paths = self.paths(&entry);
                let result = async {
                    fs.remove_all(&paths.app_dir).await?;
                    fs.remove_all(&paths.storage_dir).await
                }
                .await;
                match result {
                    Ok(()) => {
                        tracing::info!(entry = %entry, "orphaned configuration removed");
                        removed.push(entry);
                    }
                    Err(e) => {
                        tracing::error!(entry = %entry, error = %e, "failed to remove orphaned configuration")
                    }
                }
            }

            step("restart media server", self.restart(&server)).await?;
            tracing::info!(removed = removed.len(), "cleanup finished");
            Ok(CleanupReport {
                removed: removed.len(),
                configs: removed,
            })
        }
        .instrument(span)
        .await
    }
}

async fn instrumented<T>(
    op: &'static str,
    account: &str,
    host: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    let span = tracing::info_span!("op", op, id = %Uuid::new_v4(), account, host);
    fut.instrument(span.clone())
        .await
        .inspect_err(|e| span.in_scope(|| tracing::error!(error = %e, "{} failed", op)))
}

async fn step<T>(name: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
    fut.await
        .inspect_err(|e| tracing::error!(step = name, error = %e, "step failed"))
}

fn patch(document: &str, property: &str, value: u32) -> String {
    let (patched, replaced) = documents::patch_property(document, property, &value.to_string());
    if replaced == 0 {
        tracing::warn!(property, "property not found in application descriptor, left unchanged");
    }
    patched
}

/// `<app_dir>_backup_<millis>` for exactly this account.
fn is_backup_of(paths: &AccountPaths, candidate: &str) -> bool {
    candidate
        .strip_prefix(paths.app_dir.as_str())
        .and_then(|rest| rest.strip_prefix("_backup_"))
        .is_some_and(|stamp| !stamp.is_empty() && stamp.bytes().all(|b| b.is_ascii_digit()))
}

/// Account names and their `_backup_<millis>` copies. Anything else listed
/// under the config root is left alone.
fn is_removable_entry(entry: &str) -> bool {
    if AccountName::parse(entry).is_ok() {
        return true;
    }
    entry
        .rsplit_once("_backup_")
        .is_some_and(|(name, stamp)| {
            AccountName::parse(name).is_ok()
                && !stamp.is_empty()
                && stamp.bytes().all(|b| b.is_ascii_digit())
        })
}
