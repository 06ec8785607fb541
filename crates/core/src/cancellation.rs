//! Registry of live cancellation handles, partitioned by operation kind

use crate::protocol::CancelResponse;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// GET covers read-only queries, RUN covers builds and task execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Get,
    Run,
}

struct Entry {
    id: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct Partition {
    entries: HashMap<String, Entry>,
}

/// Maps `(kind, key)` to the cancellation token of the operation using that key.
///
/// Keys are expected to be unique per concurrently running operation. A second
/// `register` with a live key replaces the first handle without cancelling it.
#[derive(Default)]
pub struct CancellationRegistry {
    get: Mutex<Partition>,
    run: Mutex<Partition>,
    next_id: AtomicU64,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, kind: OperationKind) -> &Mutex<Partition> {
        match kind {
            OperationKind::Get => &self.get,
            OperationKind::Run => &self.run,
        }
    }

    /// Store `token` under `(kind, key)`, returning any handle it displaced
    pub fn register(
        &self,
        kind: OperationKind,
        key: impl Into<String>,
        token: CancellationToken,
    ) -> Option<CancellationToken> {
        self.insert(kind, key.into(), token).1
    }

    fn insert(
        &self,
        kind: OperationKind,
        key: String,
        token: CancellationToken,
    ) -> (u64, Option<CancellationToken>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .partition(kind)
            .lock()
            .entries
            .insert(key, Entry { id, token });
        (id, previous.map(|entry| entry.token))
    }

    pub fn get(&self, kind: OperationKind, key: &str) -> Option<CancellationToken> {
        self.partition(kind)
            .lock()
            .entries
            .get(key)
            .map(|entry| entry.token.clone())
    }

    pub fn remove(&self, kind: OperationKind, key: &str) -> Option<CancellationToken> {
        self.partition(kind)
            .lock()
            .entries
            .remove(key)
            .map(|entry| entry.token)
    }

    /// Remove the entry only if it is still the one registered as `id`
    fn remove_if_current(&self, kind: OperationKind, key: &str, id: u64) {
        let mut partition = self.partition(kind).lock();
        if partition.entries.get(key).is_some_and(|entry| entry.id == id) {
            partition.entries.remove(key);
        }
    }

    /// Signal the handle under `(kind, key)`.
    ///
    /// A missing key is not an error: the operation may have finished just
    /// before the cancel arrived.
    pub fn cancel(&self, kind: OperationKind, key: &str) -> CancelResponse {
        match self.get(kind, key) {
            Some(token) => {
                debug!(?kind, key, "cancelling operation");
                token.cancel();
                CancelResponse {
                    accepted: true,
                    message: format!("Cancellation requested for {key}"),
                }
            }
            None => CancelResponse {
                accepted: false,
                message: format!("No running operation found for {key}"),
            },
        }
    }

    /// Signal every registered handle in both partitions; returns how many were signalled
    pub fn cancel_all(&self) -> usize {
        let mut count = 0;
        for kind in [OperationKind::Get, OperationKind::Run] {
            let tokens: Vec<CancellationToken> = self
                .partition(kind)
                .lock()
                .entries
                .values()
                .map(|entry| entry.token.clone())
                .collect();
            for token in tokens {
                token.cancel();
                count += 1;
            }
        }
        debug!(count, "cancelled all operations");
        count
    }

    pub fn len(&self) -> usize {
        self.get.lock().entries.len() + self.run.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a fresh token and return a guard that removes it when dropped
    pub fn register_scoped(
        self: &Arc<Self>,
        kind: OperationKind,
        key: impl Into<String>,
    ) -> Registration {
        let key = key.into();
        let token = CancellationToken::new();
        let (id, previous) = self.insert(kind, key.clone(), token.clone());
        if previous.is_some() {
            tracing::warn!(?kind, key = %key, "cancellation key already in use; replaced");
        }
        Registration {
            registry: Arc::clone(self),
            kind,
            key,
            id,
            token,
        }
    }
}

/// A registered cancellation handle scoped to one operation
pub struct Registration {
    registry: Arc<CancellationRegistry>,
    kind: OperationKind,
    key: String,
    id: u64,
    token: CancellationToken,
}

impl Registration {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry
            .remove_if_current(self.kind, &self.key, self.id);
    }
}
