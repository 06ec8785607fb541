use anyhow::{Context, Result};
use gradle_bridge_core::protocol::{ProjectRequest, ToolConfig};
use gradle_bridge_core::Request;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{bridge_for, run_one};

pub async fn project_command(root: &Path, workspace: Option<PathBuf>) -> Result<()> {
    let root = absolute(root)?;
    debug!("Querying project at {}", root.display());
    let request = Request::QueryProject(ProjectRequest {
        project_root: root.clone(),
        tool_config: ToolConfig::default(),
        workspace_root: workspace,
    });
    print_result(run_one(&bridge_for(&root)?, request).await?)
}

pub async fn dependencies_command(root: &Path) -> Result<()> {
    let root = absolute(root)?;
    let request = Request::QueryDependencies(ProjectRequest {
        project_root: root.clone(),
        tool_config: ToolConfig::default(),
        workspace_root: None,
    });
    print_result(run_one(&bridge_for(&root)?, request).await?)
}

pub(crate) fn absolute(root: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(root)
        .with_context(|| format!("Project root not found: {}", root.display()))
}

fn print_result(payload: Option<serde_json::Value>) -> Result<()> {
    if let Some(payload) = payload {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    }
    Ok(())
}
