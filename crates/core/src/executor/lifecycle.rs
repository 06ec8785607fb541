//! Connect, call and event pumping shared by the worker-backed handlers

use crate::{
    error::{Error, Result},
    launcher::{Connection, Launcher},
    output::OperationSink,
    protocol::{ToolCall, ToolConfig, ToolEvent},
};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How an operation ended when it did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(Value),
    Cancelled(String),
}

/// Open (or reuse) the connection for `root`; `None` if cancelled first
pub(crate) async fn connect(
    launcher: &Launcher,
    root: &Path,
    tool: &ToolConfig,
    token: &CancellationToken,
) -> Result<Option<Arc<Connection>>> {
    tokio::select! {
        _ = token.cancelled() => Ok(None),
        connection = launcher.connect(root, tool) => connection.map(Some),
    }
}

/// Issue `call` and forward its events to `sink` until the worker ends it.
///
/// Cancelling `token` sends one advisory cancel and keeps waiting for the
/// worker's acknowledgement.
pub(crate) async fn run_call(
    connection: &Connection,
    call: ToolCall,
    token: &CancellationToken,
    sink: &OperationSink,
    forward_environment: bool,
) -> Result<Outcome> {
    let mut handle = connection.call(call)?;
    let mut cancel_sent = false;

    loop {
        let event = tokio::select! {
            _ = token.cancelled(), if !cancel_sent => {
                handle.cancel();
                cancel_sent = true;
                continue;
            }
            event = handle.next_event() => event,
        };

        match event {
            Some(ToolEvent::Progress(message)) => sink.progress(message),
            Some(ToolEvent::Output { stream, data }) => sink.output(stream, &data),
            Some(ToolEvent::Environment(environment)) => {
                if forward_environment {
                    sink.environment(environment);
                }
            }
            Some(ToolEvent::Result(payload)) => return Ok(Outcome::Completed(payload)),
            Some(ToolEvent::Cancelled(message)) => return Ok(Outcome::Cancelled(message)),
            Some(ToolEvent::Failed(message)) => return Err(Error::ToolFailure(message)),
            None => {
                debug!(call = handle.id(), "event stream ended without a terminal event");
                return Err(Error::ConnectionLost(format!(
                    "worker for {} went away during the call",
                    connection.root().display()
                )));
            }
        }
    }
}

/// Connect and run one call, mapping a cancel before connecting to `Cancelled`
pub(crate) async fn connect_and_call(
    launcher: &Launcher,
    call: ToolCall,
    token: &CancellationToken,
    sink: &OperationSink,
    forward_environment: bool,
) -> Result<Outcome> {
    let root = call.project_root.clone();
    let Some(connection) = connect(launcher, &root, &call.tool_config, token).await? else {
        return Ok(Outcome::Cancelled(
            "operation cancelled before the build tool connection was ready".to_string(),
        ));
    };
    run_call(&connection, call, token, sink, forward_environment).await
}
