use crate::error::{OrchestratorError, Result};
use crate::models::ServerRecord;
use crate::remote::command::RemoteCommand;
use crate::remote::executor::RemoteExecutor;

/// Filesystem operations on one media server.
pub struct RemoteFs<'a> {
    executor: &'a dyn RemoteExecutor,
    server: &'a ServerRecord,
}

impl<'a> RemoteFs<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, server: &'a ServerRecord) -> Self {
        Self { executor, server }
    }

    async fn run(&self, command: RemoteCommand) -> Result<String> {
        self.executor.execute(&command, self.server).await
    }

    pub async fn ensure_directory(&self, path: &str) -> Result<()> {
        tracing::debug!(host = %self.server.host_address, "creating directory {}", path);
        self.run(RemoteCommand::mkdir_p(path)).await.map(drop)
    }

    pub async fn dir_exists(&self, path: &str) -> Result<bool> {
        self.check(RemoteCommand::test_dir(path)).await
    }

    pub async fn file_exists(&self, path: &str) -> Result<bool> {
        self.check(RemoteCommand::test_file(path)).await
    }

    async fn check(&self, command: RemoteCommand) -> Result<bool> {
        let output = self.executor.execute(&command, self.server).await?;
        match output.trim() {
            "exists" => Ok(true),
            "not found" => Ok(false),
            other => Err(OrchestratorError::UnexpectedOutput {
                command: command.display().to_string(),
                output: other.to_string(),
            }),
        }
    }

    pub async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        tracing::debug!(host = %self.server.host_address, "writing {}", path);
        self.run(RemoteCommand::write_file(path, content)).await.map(drop)
    }

    pub async fn read_file(&self, path: &str) -> Result<String> {
        self.run(RemoteCommand::cat(path)).await
    }

    /// Deletes a path recursively; a missing path is not an error.
    pub async fn remove_all(&self, path: &str) -> Result<()> {
        self.run(RemoteCommand::rm_rf(path)).await.map(drop)
    }

    pub async fn copy_dir(&self, from: &str, to: &str) -> Result<()> {
        self.run(RemoteCommand::cp_r(from, to)).await.map(drop)
    }

    pub async fn set_ownership(&self, owner: &str, group: &str, mode: &str, paths: &[&str]) -> Result<()> {
        self.run(RemoteCommand::chown_r(&format!("{owner}:{group}"), paths))
            .await?;
        self.run(RemoteCommand::chmod_r(mode, paths)).await.map(drop)
    }

    pub async fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        let output = self.run(RemoteCommand::ls(path)).await?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}
