use anyhow::Result;
use gradle_bridge_core::protocol::{CancelRequest, OperationName};
use gradle_bridge_core::{InboundRequest, Request};
use std::path::PathBuf;

/// Print the request line that cancels a matching operation in a `serve` session
pub fn cancel_command(
    operation: OperationName,
    root: PathBuf,
    task: Option<String>,
    args: Vec<String>,
) -> Result<()> {
    let request = InboundRequest {
        request_id: format!("cancel-{}", operation.as_str()),
        request: Request::Cancel(CancelRequest {
            target: operation,
            project_root: root,
            task,
            args,
        }),
    };
    println!("{}", serde_json::to_string(&request)?);
    Ok(())
}
