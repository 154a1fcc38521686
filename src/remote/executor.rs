use crate::config::SshConfig;
use crate::error::{OrchestratorError, Result};
use crate::models::ServerRecord;
use crate::remote::command::RemoteCommand;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Single choke point for everything that runs on a media server.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Runs one command and returns its stdout untouched.
    async fn execute(&self, command: &RemoteCommand, server: &ServerRecord) -> Result<String>;
}

/// Password-authenticated `ssh` driven through `sshpass`.
pub struct SshExecutor {
    sshpass: PathBuf,
    user: String,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl SshExecutor {
    pub fn new(config: &SshConfig) -> Self {
        Self {
            sshpass: config.sshpass.clone(),
            user: config.user.clone(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }

    fn resolve_sshpass(&self, host: &str) -> Result<PathBuf> {
        which::which(&self.sshpass).map_err(|_| {
            OrchestratorError::transport(
                host,
                format!(
                    "{} is not installed on the orchestrator host (apt-get install sshpass)",
                    self.sshpass.display()
                ),
            )
        })
    }

    fn build(&self, sshpass: PathBuf, command: &RemoteCommand, server: &ServerRecord) -> Command {
        let mut cmd = Command::new(sshpass);
        cmd.arg("-e")
            .arg("ssh")
            .args(["-o", "StrictHostKeyChecking=no"])
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs()))
            .arg("-p")
            .arg(server.control_port.to_string())
            .arg(format!("{}@{}", self.user, server.host_address))
            .arg(command.script())
            .env("SSHPASS", &server.admin_secret)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn execute(&self, command: &RemoteCommand, server: &ServerRecord) -> Result<String> {
        let host = server.host_address.as_str();
        tracing::info!(host, port = server.control_port, "ssh: {}", command);

        let sshpass = self.resolve_sshpass(host)?;
        let child = self.build(sshpass, command, server);

        let output = match tokio::time::timeout(self.command_timeout, output_of(child)).await {
            Ok(result) => result.map_err(|e| OrchestratorError::transport(host, e.to_string()))?,
            Err(_) => {
                tracing::error!(host, "ssh: timed out after {:?}: {}", self.command_timeout, command);
                return Err(OrchestratorError::transport(
                    host,
                    format!("timed out after {}s", self.command_timeout.as_secs()),
                ));
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            tracing::error!(host, status = %output.status, "ssh: command failed: {}", command);
            return Err(OrchestratorError::transport(
                host,
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }
        if !stderr.trim().is_empty()
            && !stderr.contains("Warning")
            && !stderr.contains("Pseudo-terminal")
        {
            tracing::warn!(host, "ssh stderr: {}", stderr.trim());
        }

        tracing::debug!(host, "ssh: command succeeded");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

async fn output_of(mut child: Command) -> std::io::Result<std::process::Output> {
    child.spawn()?.wait_with_output().await
}
