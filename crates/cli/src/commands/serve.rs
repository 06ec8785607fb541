use anyhow::{Context, Result};
use gradle_bridge_core::{
    Bridge, ConfigLoader, Envelope, ErrorKind, Frame, InboundRequest,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Read requests from stdin and stream frame envelopes to stdout until stdin closes
pub async fn serve_command() -> Result<()> {
    let config = ConfigLoader::load().context("Failed to load configuration")?;
    let bridge = Arc::new(Bridge::from_config(config));
    info!("serving on stdio");

    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(envelope) = rx.recv().await {
            let mut line = match serde_json::to_vec(&envelope) {
                Ok(line) => line,
                Err(e) => {
                    warn!("dropping unserializable frame: {}", e);
                    continue;
                }
            };
            line.push(b'\n');
            if stdout.write_all(&line).await.is_err() || stdout.flush().await.is_err() {
                break;
            }
        }
    });

    let channel = Arc::new(tx.clone());
    let mut operations = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read request")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<InboundRequest>(&line) {
                    Ok(inbound) => {
                        debug!(request_id = %inbound.request_id, "request received");
                        let request_id = inbound.request_id.clone();
                        let handle = bridge.submit(inbound.request_id, inbound.request, channel.clone());
                        let tx = tx.clone();
                        operations.spawn(async move {
                            if let Err(e) = handle.await {
                                report_crash(&tx, request_id, e);
                            }
                        });
                    }
                    Err(e) => reject(&tx, &line, e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; cancelling all operations");
                bridge.cancel_all();
                break;
            }
            Some(_) = operations.join_next(), if !operations.is_empty() => {}
        }
    }

    while operations.join_next().await.is_some() {}
    if let Err(e) = bridge.shutdown().await {
        warn!("shutdown: {}", e);
    }

    drop(channel);
    drop(tx);
    writer.await.context("Frame writer failed")?;
    Ok(())
}

/// Terminate a request whose operation task died before sending its own terminal frame
fn report_crash(tx: &mpsc::UnboundedSender<Envelope>, request_id: String, error: JoinError) {
    error!(request_id = %request_id, "operation task failed: {}", error);
    let _ = tx.send(Envelope {
        request_id,
        frame: Frame::Error {
            kind: ErrorKind::Internal,
            message: format!("operation task failed: {error}"),
        },
    });
}

/// Answer an unparseable request line with an error frame
fn reject(tx: &mpsc::UnboundedSender<Envelope>, line: &str, error: serde_json::Error) {
    let request_id = serde_json::from_str::<Value>(line)
        .ok()
        .and_then(|value| value.get("requestId")?.as_str().map(str::to_string))
        .unwrap_or_default();
    warn!(request_id = %request_id, "rejecting request: {}", error);
    let _ = tx.send(Envelope {
        request_id,
        frame: Frame::Error {
            kind: ErrorKind::Validation,
            message: format!("invalid request: {error}"),
        },
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_crashed_operation_gets_internal_error_frame() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let join_error = tokio::spawn(async { panic!("resolver blew up") })
            .await
            .unwrap_err();

        report_crash(&tx, "r7".to_string(), join_error);

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.request_id, "r7");
        let Frame::Error { kind, message } = envelope.frame else {
            panic!("expected error frame");
        };
        assert_eq!(kind, ErrorKind::Internal);
        assert!(message.starts_with("operation task failed"));
    }

    #[test]
    fn test_rejected_line_keeps_request_id() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let line = r#"{"requestId":"r1","operation":"bogus"}"#;
        let error = serde_json::from_str::<InboundRequest>(line).unwrap_err();

        reject(&tx, line, error);

        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.request_id, "r1");
        assert!(matches!(
            envelope.frame,
            Frame::Error {
                kind: ErrorKind::Validation,
                ..
            }
        ));
    }
}
