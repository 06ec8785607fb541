//! Output buffering and ordered frame emission for one operation

use crate::protocol::{EnvironmentInfo, Envelope, Frame, StreamTag};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Transport-agnostic sink for outbound frames
pub trait ReplyChannel: Send + Sync {
    /// Deliver one envelope; returns false once the transport is gone
    fn send(&self, envelope: Envelope) -> bool;
}

impl ReplyChannel for mpsc::UnboundedSender<Envelope> {
    fn send(&self, envelope: Envelope) -> bool {
        mpsc::UnboundedSender::send(self, envelope).is_ok()
    }
}

/// Keeps every envelope in memory, in emission order
#[derive(Default)]
pub struct MemoryReply {
    envelopes: Mutex<Vec<Envelope>>,
}

impl MemoryReply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn envelopes(&self) -> Vec<Envelope> {
        self.envelopes.lock().clone()
    }

    pub fn frames_for(&self, request_id: &str) -> Vec<Frame> {
        self.envelopes
            .lock()
            .iter()
            .filter(|envelope| envelope.request_id == request_id)
            .map(|envelope| envelope.frame.clone())
            .collect()
    }
}

impl ReplyChannel for MemoryReply {
    fn send(&self, envelope: Envelope) -> bool {
        self.envelopes.lock().push(envelope);
        true
    }
}

/// Append-only byte buffer for one stream.
///
/// Bytes are released as a chunk when a line terminator is seen or the buffer
/// reaches `threshold`, whichever comes first; no chunk is longer than
/// `threshold`.
#[derive(Debug)]
pub struct OutputMultiplexer {
    stream: StreamTag,
    threshold: usize,
    buffer: Vec<u8>,
}

impl OutputMultiplexer {
    pub fn new(stream: StreamTag, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            stream,
            threshold,
            buffer: Vec::with_capacity(threshold),
        }
    }

    pub fn stream(&self) -> StreamTag {
        self.stream
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Buffer `data`, returning every chunk that became ready
    pub fn write(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        let mut rest = data;

        while !rest.is_empty() {
            let room = self.threshold - self.buffer.len();
            let window = &rest[..rest.len().min(room)];

            match window.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.buffer.extend_from_slice(&window[..=pos]);
                    rest = &rest[pos + 1..];
                    chunks.push(self.take());
                }
                None => {
                    self.buffer.extend_from_slice(window);
                    rest = &rest[window.len()..];
                    if self.buffer.len() == self.threshold {
                        chunks.push(self.take());
                    }
                }
            }
        }

        chunks
    }

    pub fn write_byte(&mut self, byte: u8) -> Option<Vec<u8>> {
        self.write(&[byte]).pop()
    }

    /// Release whatever is still buffered
    pub fn close(&mut self) -> Option<Vec<u8>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    fn take(&mut self) -> Vec<u8> {
        std::mem::replace(&mut self.buffer, Vec::with_capacity(self.threshold))
    }
}

struct SinkState {
    request_id: String,
    channel: Arc<dyn ReplyChannel>,
    stdout: OutputMultiplexer,
    stderr: OutputMultiplexer,
    environment_sent: bool,
    terminated: bool,
}

impl SinkState {
    fn emit(&self, frame: Frame) {
        let delivered = self.channel.send(Envelope {
            request_id: self.request_id.clone(),
            frame,
        });
        if !delivered {
            tracing::debug!(request_id = %self.request_id, "reply channel closed; frame dropped");
        }
    }

    fn emit_chunks(&self, stream: StreamTag, chunks: Vec<Vec<u8>>) {
        for data in chunks {
            self.emit(Frame::Output { stream, data });
        }
    }
}

/// Frame writer for one operation.
///
/// All writes for the operation go through one lock, so output, progress and
/// the terminal frame reach the channel in the order they were produced.
/// Nothing is emitted after the terminal frame.
#[derive(Clone)]
pub struct OperationSink {
    inner: Arc<Mutex<SinkState>>,
}

impl OperationSink {
    pub fn new(
        request_id: impl Into<String>,
        channel: Arc<dyn ReplyChannel>,
        flush_threshold: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SinkState {
                request_id: request_id.into(),
                channel,
                stdout: OutputMultiplexer::new(StreamTag::Stdout, flush_threshold),
                stderr: OutputMultiplexer::new(StreamTag::Stderr, flush_threshold),
                environment_sent: false,
                terminated: false,
            })),
        }
    }

    pub fn request_id(&self) -> String {
        self.inner.lock().request_id.clone()
    }

    pub fn progress(&self, message: impl Into<String>) {
        let state = self.inner.lock();
        if state.terminated {
            return;
        }
        state.emit(Frame::Progress {
            message: message.into(),
        });
    }

    pub fn output(&self, stream: StreamTag, data: &[u8]) {
        let mut state = self.inner.lock();
        if state.terminated {
            return;
        }
        let chunks = match stream {
            StreamTag::Stdout => state.stdout.write(data),
            StreamTag::Stderr => state.stderr.write(data),
        };
        state.emit_chunks(stream, chunks);
    }

    /// Emit the environment frame; only the first call per operation has effect
    pub fn environment(&self, environment: EnvironmentInfo) {
        let mut state = self.inner.lock();
        if state.terminated || state.environment_sent {
            return;
        }
        state.environment_sent = true;
        state.emit(Frame::Environment { environment });
    }

    /// Flush both streams and emit `frame` as the terminal frame.
    ///
    /// Returns false if the operation had already terminated.
    pub fn finish(&self, frame: Frame) -> bool {
        debug_assert!(frame.is_terminal());
        let mut state = self.inner.lock();
        if state.terminated {
            return false;
        }
        if let Some(data) = state.stdout.close() {
            state.emit_chunks(StreamTag::Stdout, vec![data]);
        }
        if let Some(data) = state.stderr.close() {
            state.emit_chunks(StreamTag::Stderr, vec![data]);
        }
        state.emit(frame);
        state.terminated = true;
        true
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.lock().terminated
    }
}
