use anyhow::Result;
use clap::Args;
use gradle_bridge_core::Request;
use gradle_bridge_core::protocol::{DebugOptions, RunRequest, ToolConfig};
use std::path::Path;
use tracing::info;

use super::project::absolute;
use super::{bridge_for, run_one};

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugArgs {
    /// Attach the build JVM to a debugger listening on this port
    #[arg(long)]
    pub debug_port: Option<u16>,

    /// Clean the task's outputs before running it under the debugger
    #[arg(long, requires = "debug_port")]
    pub clean: bool,
}

impl DebugArgs {
    fn options(&self) -> Option<DebugOptions> {
        self.debug_port.map(|port| DebugOptions {
            port,
            clean_output_cache: self.clean,
        })
    }
}

pub async fn run_command(
    root: &Path,
    task: Option<String>,
    args: Vec<String>,
    debug: DebugArgs,
    color: bool,
) -> Result<()> {
    let root = absolute(root)?;
    let run = RunRequest {
        project_root: root.clone(),
        tool_config: ToolConfig::default(),
        task: task.clone(),
        args,
        output_color_preference: color,
        debug: debug.options(),
        stdin: None,
        env: Default::default(),
    };
    let request = match task {
        Some(_) => Request::RunTask(run),
        None => Request::RunBuild(run),
    };

    if run_one(&bridge_for(&root)?, request).await?.is_some() {
        info!("Build finished");
        eprintln!("BUILD SUCCESSFUL");
    }
    Ok(())
}
