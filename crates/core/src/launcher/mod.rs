//! Process launcher: one lazily created, reused worker connection per project root

pub mod connection;
pub mod process;

pub use connection::{CallHandle, Connection};
pub use process::{ConnectionFactory, ProcessConnectionFactory};

use crate::{error::Result, protocol::ToolConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

type Slot = Arc<OnceCell<Arc<Connection>>>;

pub struct Launcher {
    factory: Arc<dyn ConnectionFactory>,
    connections: Mutex<HashMap<PathBuf, Slot>>,
}

impl Launcher {
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            factory,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Return the connection for `root`, opening it on first use.
    ///
    /// Concurrent first connects share one open. A failed open is not cached
    /// and not retried; the next operation for the root tries again. A
    /// connection that has since closed is replaced by a fresh one.
    pub async fn connect(&self, root: &Path, tool: &ToolConfig) -> Result<Arc<Connection>> {
        let slot = {
            let mut connections = self.connections.lock();
            let slot = connections.entry(root.to_path_buf()).or_default();
            if slot.get().is_some_and(|connection| connection.is_closed()) {
                *slot = Slot::default();
            }
            slot.clone()
        };

        let connection = slot
            .get_or_try_init(|| async {
                info!(root = %root.display(), "opening worker connection");
                self.factory.open(root, tool).await.map(Arc::new)
            })
            .await?;
        Ok(connection.clone())
    }

    /// Tear down the connection for `root`, failing its outstanding calls
    pub fn disconnect(&self, root: &Path) -> bool {
        let slot = self.connections.lock().remove(root);
        match slot.as_ref().and_then(|slot| slot.get()) {
            Some(connection) => {
                connection.disconnect();
                true
            }
            None => false,
        }
    }

    pub fn disconnect_all(&self) -> usize {
        let slots: Vec<Slot> = self
            .connections
            .lock()
            .drain()
            .map(|(_, slot)| slot)
            .collect();
        let mut count = 0;
        for slot in slots {
            if let Some(connection) = slot.get() {
                connection.disconnect();
                count += 1;
            }
        }
        count
    }

    pub fn connected_roots(&self) -> Vec<PathBuf> {
        self.connections
            .lock()
            .iter()
            .filter(|(_, slot)| slot.get().is_some_and(|connection| !connection.is_closed()))
            .map(|(root, _)| root.clone())
            .collect()
    }
}
