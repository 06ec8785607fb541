//! Client side of the worker protocol for one project root

use crate::{
    error::{Error, Result},
    protocol::{BridgeMessage, CallKind, PROTOCOL_VERSION, ToolCall, ToolEvent, WorkerMessage},
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type CallTable = Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<ToolEvent>>>>;

/// A live, handshaken connection to a tool worker.
///
/// Many calls may be in flight at once; a reader task routes worker events to
/// each call by id. When the worker goes away every outstanding call sees its
/// event stream end, which callers report as a lost connection.
pub struct Connection {
    root: PathBuf,
    capabilities: HashSet<CallKind>,
    outgoing: mpsc::UnboundedSender<BridgeMessage>,
    calls: CallTable,
    next_id: AtomicU64,
    closed: CancellationToken,
    disconnected: AtomicBool,
    child: Mutex<Option<Child>>,
}

impl Connection {
    /// Perform the handshake over `reader`/`writer` and start the I/O tasks
    pub async fn establish<R, W>(root: PathBuf, reader: R, writer: W) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut writer = writer;
        let mut lines = BufReader::new(reader).lines();

        write_message(
            &mut writer,
            &BridgeMessage::Hello {
                protocol_version: PROTOCOL_VERSION,
            },
        )
        .await
        .map_err(|e| Error::ConnectionError(format!("handshake write failed: {e}")))?;

        let first = lines
            .next_line()
            .await
            .map_err(|e| Error::ConnectionError(format!("handshake read failed: {e}")))?
            .ok_or_else(|| {
                Error::ConnectionError("worker exited before completing the handshake".to_string())
            })?;

        let capabilities = match serde_json::from_str::<WorkerMessage>(&first) {
            Ok(WorkerMessage::Hello {
                protocol_version,
                capabilities,
            }) if protocol_version == PROTOCOL_VERSION => capabilities,
            Ok(WorkerMessage::Hello {
                protocol_version, ..
            }) => {
                return Err(Error::ConnectionError(format!(
                    "worker speaks protocol version {protocol_version}, expected {PROTOCOL_VERSION}"
                )));
            }
            Ok(_) => {
                return Err(Error::ConnectionError(
                    "worker did not start with a hello message".to_string(),
                ));
            }
            Err(e) => {
                return Err(Error::ConnectionError(format!("invalid handshake: {e}")));
            }
        };

        info!(root = %root.display(), ?capabilities, "worker connected");

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let calls: CallTable = Arc::new(Mutex::new(HashMap::new()));
        let closed = CancellationToken::new();

        tokio::spawn(write_loop(writer, outgoing_rx, closed.clone()));
        tokio::spawn(read_loop(lines, calls.clone(), closed.clone(), root.clone()));

        Ok(Self {
            root,
            capabilities: capabilities.into_iter().collect(),
            outgoing,
            calls,
            next_id: AtomicU64::new(1),
            closed,
            disconnected: AtomicBool::new(false),
            child: Mutex::new(None),
        })
    }

    /// Tie the worker process lifetime to this connection
    pub fn attach_child(&self, child: Child) {
        *self.child.lock() = Some(child);
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn supports(&self, kind: CallKind) -> bool {
        self.capabilities.contains(&kind)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection has closed for any reason
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    /// Start a call on the worker
    pub fn call(&self, call: ToolCall) -> Result<CallHandle> {
        if !self.supports(call.kind) {
            return Err(Error::ValidationError(format!(
                "worker for {} does not support {:?}",
                self.root.display(),
                call.kind
            )));
        }
        if self.is_closed() {
            return Err(self.lost());
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (events_tx, events) = mpsc::unbounded_channel();
        self.calls.lock().insert(id, events_tx);

        // The reader clears the table after marking the connection closed
        if self.is_closed() {
            self.calls.lock().remove(&id);
            return Err(self.lost());
        }

        debug!(id, kind = ?call.kind, "sending call");
        if self.outgoing.send(BridgeMessage::Call { id, call }).is_err() {
            self.calls.lock().remove(&id);
            return Err(self.lost());
        }

        Ok(CallHandle {
            id,
            events,
            calls: self.calls.clone(),
            outgoing: self.outgoing.clone(),
            cancel_sent: false,
        })
    }

    /// Close the connection; outstanding calls observe a lost connection.
    ///
    /// Only the first call has any effect.
    pub fn disconnect(&self) {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(root = %self.root.display(), "disconnecting worker");
        let _ = self.outgoing.send(BridgeMessage::Shutdown);
        self.closed.cancel();
        self.calls.lock().clear();
        if let Some(mut child) = self.child.lock().take() {
            if let Err(e) = child.start_kill() {
                debug!("worker already exited: {}", e);
            }
        }
    }

    fn lost(&self) -> Error {
        Error::ConnectionLost(format!(
            "connection to worker for {} is closed",
            self.root.display()
        ))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Event stream and control for one in-flight call
pub struct CallHandle {
    id: u64,
    events: mpsc::UnboundedReceiver<ToolEvent>,
    calls: CallTable,
    outgoing: mpsc::UnboundedSender<BridgeMessage>,
    cancel_sent: bool,
}

impl CallHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event for this call; `None` means the connection was lost
    pub async fn next_event(&mut self) -> Option<ToolEvent> {
        self.events.recv().await
    }

    /// Ask the worker to stop this call. Advisory; sent at most once.
    pub fn cancel(&mut self) {
        if self.cancel_sent {
            return;
        }
        self.cancel_sent = true;
        debug!(id = self.id, "sending cancel");
        let _ = self.outgoing.send(BridgeMessage::Cancel { id: self.id });
    }
}

impl Drop for CallHandle {
    fn drop(&mut self) {
        self.calls.lock().remove(&self.id);
    }
}

async fn write_message<W>(writer: &mut W, message: &BridgeMessage) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}

async fn write_loop<W>(
    mut writer: W,
    mut outgoing: mpsc::UnboundedReceiver<BridgeMessage>,
    closed: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            message = outgoing.recv() => {
                let Some(message) = message else { break };
                let is_shutdown = matches!(message, BridgeMessage::Shutdown);
                if let Err(e) = write_message(&mut writer, &message).await {
                    warn!("worker write failed: {}", e);
                    closed.cancel();
                    break;
                }
                if is_shutdown {
                    break;
                }
            }
            _ = closed.cancelled() => break,
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop<R>(
    mut lines: Lines<BufReader<R>>,
    calls: CallTable,
    closed: CancellationToken,
    root: PathBuf,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = closed.cancelled() => break,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!(root = %root.display(), "worker closed its output");
                break;
            }
            Err(e) => {
                warn!(root = %root.display(), "worker read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let message = match serde_json::from_str::<WorkerMessage>(&line) {
            Ok(message) => message,
            Err(e) => {
                warn!("skipping malformed worker message: {}", e);
                continue;
            }
        };
        let Some((id, event)) = message.into_event() else {
            debug!("ignoring repeated hello from worker");
            continue;
        };

        let terminal = event.is_terminal();
        let mut table = calls.lock();
        match table.get(&id) {
            Some(sender) => {
                let _ = sender.send(event);
                if terminal {
                    table.remove(&id);
                }
            }
            None => debug!(id, "event for unknown or finished call"),
        }
    }

    closed.cancel();
    calls.lock().clear();
}
