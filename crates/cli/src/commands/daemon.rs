use anyhow::Result;
use gradle_bridge_core::Request;
use gradle_bridge_core::protocol::{DaemonRequest, ToolConfig};

use super::project::absolute;
use super::{bridge_for, run_one};
use crate::cli::DaemonAction;
use crate::display::render_daemons;

pub async fn daemon_command(action: DaemonAction) -> Result<()> {
    let (root, stop) = match action {
        DaemonAction::Status { root } => (root, false),
        DaemonAction::Stop { root } => (root, true),
    };
    let root = absolute(&root)?;
    let daemon = DaemonRequest {
        project_root: root.clone(),
        tool_config: ToolConfig::default(),
    };
    let request = if stop {
        Request::StopDaemons(daemon)
    } else {
        Request::DaemonStatus(daemon)
    };

    let Some(payload) = run_one(&bridge_for(&root)?, request).await? else {
        return Ok(());
    };
    print!("{}", render_daemons(&payload));
    if let Some(messages) = payload.get("messages").and_then(|m| m.as_array()) {
        for message in messages.iter().filter_map(|m| m.as_str()) {
            println!("{}", message);
        }
    }
    Ok(())
}
