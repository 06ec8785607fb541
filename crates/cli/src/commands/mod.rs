pub mod cancel;
pub mod daemon;
pub mod project;
pub mod run;
pub mod serve;

pub use cancel::cancel_command;
pub use daemon::daemon_command;
pub use project::{dependencies_command, project_command};
pub use run::{DebugArgs, run_command};
pub use serve::serve_command;

use anyhow::{Context, Result, bail};
use gradle_bridge_core::{
    Bridge, ConfigLoader, Envelope, Frame, Request,
    protocol::StreamTag,
};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Build a bridge from the configuration visible from `root`
pub(crate) fn bridge_for(root: &Path) -> Result<Arc<Bridge>> {
    let config = ConfigLoader::load_from_path(root)
        .with_context(|| format!("Failed to load configuration for {}", root.display()))?;
    debug!("worker command: {:?}", config.worker.command);
    Ok(Arc::new(Bridge::from_config(config)))
}

/// Run one request to its terminal frame, echoing output as it arrives.
///
/// Returns the result payload, or `None` if the operation was cancelled.
pub(crate) async fn run_one(bridge: &Arc<Bridge>, request: Request) -> Result<Option<Value>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
    let handle = bridge.submit("cli", request, Arc::new(tx));

    let interrupt = {
        let bridge = Arc::clone(bridge);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted; cancelling");
                bridge.cancel_all();
            }
        })
    };

    let mut outcome = None;
    while let Some(envelope) = rx.recv().await {
        match envelope.frame {
            Frame::Progress { message } => eprintln!("> {}", message),
            Frame::Output { stream, data } => write_output(stream, &data)?,
            Frame::Environment { environment } => {
                debug!("environment: {:?}", environment);
            }
            Frame::Result { payload } => outcome = Some(Ok(Some(payload))),
            Frame::Cancelled { message, .. } => {
                eprintln!("Cancelled: {}", message);
                outcome = Some(Ok(None));
            }
            Frame::Error { kind, message } => {
                outcome = Some(Err(anyhow::anyhow!("{:?}: {}", kind, message)));
            }
        }
    }
    interrupt.abort();
    handle.await.context("Operation task failed")?;

    if let Err(e) = bridge.shutdown().await {
        debug!("shutdown: {}", e);
    }
    match outcome {
        Some(result) => result,
        None => bail!("Operation ended without a terminal frame"),
    }
}

fn write_output(stream: StreamTag, data: &[u8]) -> Result<()> {
    match stream {
        StreamTag::Stdout => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(data)?;
            stdout.flush()?;
        }
        StreamTag::Stderr => {
            let mut stderr = std::io::stderr().lock();
            stderr.write_all(data)?;
            stderr.flush()?;
        }
    }
    Ok(())
}
