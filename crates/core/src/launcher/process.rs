//! Starts the tool worker as a child process

use super::connection::Connection;
use crate::{
    config::WorkerConfig,
    error::{Error, Result},
    protocol::ToolConfig,
};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// Opens a handshaken connection for a project root
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn open(&self, root: &Path, tool: &ToolConfig) -> Result<Connection>;
}

/// Spawns `worker.command` in the project root and speaks the protocol over its stdio
pub struct ProcessConnectionFactory {
    worker: WorkerConfig,
}

impl ProcessConnectionFactory {
    pub fn new(worker: WorkerConfig) -> Self {
        Self { worker }
    }

    fn command(&self, root: &Path, tool: &ToolConfig) -> Result<Command> {
        let (program, args) = self.worker.command.split_first().ok_or_else(|| {
            Error::ConnectionError("no worker command configured (worker.command)".to_string())
        })?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &self.worker.env {
            cmd.env(key, value);
        }
        if let Some(user_home) = &tool.user_home {
            cmd.env("GRADLE_USER_HOME", user_home);
        }
        Ok(cmd)
    }
}

#[async_trait]
impl ConnectionFactory for ProcessConnectionFactory {
    async fn open(&self, root: &Path, tool: &ToolConfig) -> Result<Connection> {
        let mut cmd = self.command(root, tool)?;
        info!(root = %root.display(), command = ?self.worker.command, "starting worker");

        let mut child = cmd.spawn().map_err(|e| {
            Error::ConnectionError(format!(
                "failed to start worker `{}`: {e}",
                self.worker.command.join(" ")
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::ConnectionError("worker stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ConnectionError("worker stdout unavailable".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            let root = root.display().to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(root = %root, "worker: {}", line);
                }
            });
        }

        let connection = Connection::establish(root.to_path_buf(), stdout, stdin).await?;
        connection.attach_child(child);
        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_command_is_connection_error() {
        let temp_dir = TempDir::new().unwrap();
        let factory = ProcessConnectionFactory::new(WorkerConfig::default());
        let result = factory.open(temp_dir.path(), &ToolConfig::default()).await;
        assert!(matches!(result, Err(Error::ConnectionError(_))));
    }

    #[tokio::test]
    async fn test_unstartable_worker_reported_once() {
        let temp_dir = TempDir::new().unwrap();
        let factory = ProcessConnectionFactory::new(WorkerConfig {
            command: vec!["/nonexistent/gradle-worker".to_string()],
            env: HashMap::new(),
        });
        let err = factory
            .open(temp_dir.path(), &ToolConfig::default())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("failed to start worker"));
    }
}
