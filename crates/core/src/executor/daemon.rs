//! Daemon status and stop, run through the tool's own command line

use super::lifecycle::Outcome;
use crate::{
    config::ToolDefaults,
    error::{Error, Result},
    output::OperationSink,
    protocol::ToolConfig,
};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

static STATUS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s+(\d+)\s+([A-Z]+)\s+([\x00-\x7F]+)$").expect("status pattern is valid")
});

/// One line of the daemon status table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonInfo {
    pub pid: String,
    /// IDLE, BUSY, STOPPED, ...
    pub status: String,
    pub info: String,
}

/// Parse status output, skipping banner and other non-matching lines
pub fn parse_status(output: &str) -> Vec<DaemonInfo> {
    output
        .lines()
        .filter_map(|line| {
            let Some(captures) = STATUS_LINE.captures(line) else {
                debug!("skipping status line: {}", line);
                return None;
            };
            Some(DaemonInfo {
                pid: captures[1].to_string(),
                status: captures[2].to_string(),
                info: captures[3].to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl DaemonCommand {
    /// The wrapper script when enabled and present in `root`, else the configured executable
    pub fn new(root: &Path, tool: &ToolConfig, defaults: &ToolDefaults, flag: &str) -> Self {
        let wrapper = root.join(wrapper_script());
        let program = if tool.wrapper_enabled && wrapper.is_file() {
            wrapper
        } else {
            PathBuf::from(&defaults.executable)
        };
        let mut env = BTreeMap::new();
        if let Some(user_home) = &tool.user_home {
            env.insert(
                "GRADLE_USER_HOME".to_string(),
                user_home.display().to_string(),
            );
        }
        Self {
            program,
            args: vec![flag.to_string()],
            cwd: root.to_path_buf(),
            env,
        }
    }
}

fn wrapper_script() -> &'static str {
    if cfg!(windows) { "gradlew.bat" } else { "gradlew" }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs a daemon command to completion
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &DaemonCommand) -> Result<CommandOutput>;
}

/// Spawns the command as a child process
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &DaemonCommand) -> Result<CommandOutput> {
        debug!(program = %command.program.display(), args = ?command.args, "running daemon command");
        let output = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.cwd)
            .envs(&command.env)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                Error::ConnectionError(format!(
                    "failed to run {}: {e}",
                    command.program.display()
                ))
            })?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run one command, giving up when `token` is cancelled; a dropped run kills the child
async fn run_cancellable(
    runner: &dyn CommandRunner,
    command: &DaemonCommand,
    token: &CancellationToken,
) -> Result<Option<CommandOutput>> {
    tokio::select! {
        _ = token.cancelled() => Ok(None),
        output = runner.run(command) => {
            let output = output?;
            if output.success {
                Ok(Some(output))
            } else {
                let message = if output.stderr.trim().is_empty() {
                    output.stdout
                } else {
                    output.stderr
                };
                Err(Error::ToolFailure(message.trim_end().to_string()))
            }
        }
    }
}

pub(super) async fn status(
    runner: &dyn CommandRunner,
    command: DaemonCommand,
    token: &CancellationToken,
    sink: &OperationSink,
) -> Result<Outcome> {
    sink.progress("Querying daemon status");
    let Some(output) = run_cancellable(runner, &command, token).await? else {
        return Ok(Outcome::Cancelled("daemon status cancelled".to_string()));
    };
    let daemons = parse_status(&output.stdout);
    Ok(Outcome::Completed(serde_json::json!({ "daemons": daemons })))
}

/// Stop every daemon, reporting the daemons seen before stopping
pub(super) async fn stop(
    runner: &dyn CommandRunner,
    status_command: DaemonCommand,
    stop_command: DaemonCommand,
    token: &CancellationToken,
    sink: &OperationSink,
) -> Result<Outcome> {
    sink.progress("Querying daemon status");
    let Some(before) = run_cancellable(runner, &status_command, token).await? else {
        return Ok(Outcome::Cancelled("stop daemons cancelled".to_string()));
    };
    let daemons = parse_status(&before.stdout);

    sink.progress("Stopping daemons");
    let Some(output) = run_cancellable(runner, &stop_command, token).await? else {
        return Ok(Outcome::Cancelled("stop daemons cancelled".to_string()));
    };
    let messages: Vec<&str> = output
        .stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    Ok(Outcome::Completed(serde_json::json!({
        "daemons": daemons,
        "messages": messages,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_status_line() {
        let daemons = parse_status("  56783 IDLE 6.4");
        assert_eq!(
            daemons,
            vec![DaemonInfo {
                pid: "56783".to_string(),
                status: "IDLE".to_string(),
                info: "6.4".to_string(),
            }]
        );
    }

    #[test]
    fn test_banner_lines_are_skipped() {
        let output = "Some banner text\n   PID STATUS   INFO\n  56783 IDLE     8.5\n  60211 BUSY     8.5\n\nOnly Daemons for the current Gradle version are displayed.\n";
        let daemons = parse_status(output);
        assert_eq!(daemons.len(), 2);
        assert_eq!(daemons[1].status, "BUSY");
        assert_eq!(daemons[1].info, "8.5");
    }

    #[test]
    fn test_command_prefers_wrapper() {
        let temp_dir = TempDir::new().unwrap();
        let defaults = ToolDefaults::default();
        let tool = ToolConfig {
            user_home: Some(PathBuf::from("/home/dev/.gradle")),
            ..ToolConfig::default()
        };

        let command = DaemonCommand::new(temp_dir.path(), &tool, &defaults, "--status");
        assert_eq!(command.program, PathBuf::from("gradle"));
        assert_eq!(command.args, vec!["--status".to_string()]);
        assert_eq!(
            command.env.get("GRADLE_USER_HOME").map(String::as_str),
            Some("/home/dev/.gradle")
        );

        std::fs::write(temp_dir.path().join(wrapper_script()), "#!/bin/sh\n").unwrap();
        let command = DaemonCommand::new(temp_dir.path(), &tool, &defaults, "--stop");
        assert_eq!(command.program, temp_dir.path().join(wrapper_script()));

        let no_wrapper = ToolConfig {
            wrapper_enabled: false,
            ..tool
        };
        let command = DaemonCommand::new(temp_dir.path(), &no_wrapper, &defaults, "--stop");
        assert_eq!(command.program, PathBuf::from("gradle"));
    }
}
