use crate::config::{LayoutConfig, RestartConfig};
use crate::error::{OrchestratorError, Result};
use crate::models::{ServerRecord, ServiceStatus};
use crate::remote::{RemoteCommand, RemoteExecutor};
use std::time::Duration;
use tokio::time::Instant;

const ACTIVE: &str = "active";

/// Drives the Wowza systemd unit on a media server.
pub struct ServiceController {
    unit: String,
    startup_script: String,
    initial_delay: Duration,
    max_delay: Duration,
    max_wait: Duration,
}

impl ServiceController {
    pub fn new(layout: &LayoutConfig, restart: &RestartConfig) -> Self {
        Self {
            unit: layout.service_unit.clone(),
            startup_script: layout.startup_script(),
            initial_delay: restart.initial_delay(),
            max_delay: restart.max_delay(),
            max_wait: restart.max_wait(),
        }
    }

    /// Restarts the unit and waits for it to report `active`.
    ///
    /// Polls with exponential backoff starting at `initial_delay`, capped at
    /// `max_delay`, for at most `max_wait`.
    pub async fn restart_and_verify(&self, executor: &dyn RemoteExecutor, server: &ServerRecord) -> Result<()> {
        let host = server.host_address.as_str();
        tracing::info!(host, unit = %self.unit, "restarting media server");
        executor
            .execute(&RemoteCommand::systemctl("restart", &self.unit), server)
            .await?;

        let started = Instant::now();
        let deadline = started + self.max_wait;
        let mut delay = self.initial_delay;
        loop {
            tokio::time::sleep(delay).await;
            let state = self.active_state(executor, server).await?;
            if state == ACTIVE {
                tracing::info!(host, elapsed = ?started.elapsed(), "media server is active");
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::error!(host, state = %state, "media server did not become active");
                return Err(OrchestratorError::ServiceNotActive {
                    host: host.to_string(),
                    status: state,
                });
            }
            tracing::debug!(host, state = %state, "media server not active yet");
            delay = (delay * 2).min(self.max_delay).min(deadline - now);
        }
    }

    pub async fn stop(&self, executor: &dyn RemoteExecutor, server: &ServerRecord) -> Result<()> {
        tracing::info!(host = %server.host_address, unit = %self.unit, "stopping media server");
        executor
            .execute(&RemoteCommand::systemctl("stop", &self.unit), server)
            .await
            .map(drop)
    }

    pub async fn active_state(&self, executor: &dyn RemoteExecutor, server: &ServerRecord) -> Result<String> {
        let output = executor
            .execute(&RemoteCommand::is_active(&self.unit), server)
            .await?;
        Ok(output.trim().to_string())
    }

    pub async fn status(&self, executor: &dyn RemoteExecutor, server: &ServerRecord) -> Result<ServiceStatus> {
        let status = self.active_state(executor, server).await?;
        let version = executor
            .execute(&RemoteCommand::engine_version(&self.startup_script), server)
            .await?;
        Ok(ServiceStatus {
            is_running: status == ACTIVE,
            status,
            version: version.trim().to_string(),
        })
    }
}
