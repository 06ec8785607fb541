use anyhow::Result;
use clap::{Parser, Subcommand};
use gradle_bridge_core::protocol::OperationName;
use std::path::PathBuf;

use crate::commands::{
    DebugArgs, cancel_command, daemon_command, dependencies_command, project_command, run_command,
    serve_command,
};

#[derive(Parser, Debug)]
#[command(name = "gradle-bridge")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    RUST_LOG=debug    Enable debug logging")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve JSON-lines requests on stdin, writing frames to stdout
    Serve,
    /// Query and resolve the project model
    #[command(visible_alias = "p")]
    Project {
        /// Project root directory
        root: PathBuf,

        /// Workspace that foreign source folders are linked relative to
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },
    /// Query the dependency tree
    Dependencies {
        /// Project root directory
        root: PathBuf,
    },
    /// Run a build, or a single task with --task
    #[command(visible_alias = "r")]
    Run {
        /// Project root directory
        root: PathBuf,

        /// Task to run
        #[arg(short, long)]
        task: Option<String>,

        #[command(flatten)]
        debug: DebugArgs,

        /// Ask the tool for coloured console output
        #[arg(long)]
        color: bool,

        /// Arguments passed to the build tool
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Print a cancel request line for a running `serve` session
    Cancel {
        /// Operation to cancel (queryProject, runTask, ...)
        #[arg(value_parser = parse_operation)]
        operation: OperationName,

        /// Project root directory
        root: PathBuf,

        #[arg(short, long)]
        task: Option<String>,

        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Inspect or stop build tool daemons
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum DaemonAction {
    /// List running daemons
    Status {
        /// Project root directory
        #[arg(default_value = ".")]
        root: PathBuf,
    },
    /// Stop all daemons
    Stop {
        /// Project root directory
        #[arg(default_value = ".")]
        root: PathBuf,
    },
}

fn parse_operation(value: &str) -> std::result::Result<OperationName, String> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| format!("unknown operation `{value}`"))
}

impl Commands {
    /// Execute the command
    pub async fn execute(self) -> Result<()> {
        match self {
            Commands::Serve => serve_command().await,
            Commands::Project { root, workspace } => project_command(&root, workspace).await,
            Commands::Dependencies { root } => dependencies_command(&root).await,
            Commands::Run {
                root,
                task,
                debug,
                color,
                args,
            } => run_command(&root, task, args, debug, color).await,
            Commands::Cancel {
                operation,
                root,
                task,
                args,
            } => cancel_command(operation, root, task, args),
            Commands::Daemon { action } => daemon_command(action).await,
        }
    }
}
