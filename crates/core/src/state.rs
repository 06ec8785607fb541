//! Persisted build state, one small binary file per project root

use crate::{
    config::StateConfig,
    error::{Error, Result},
};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub const PLUGIN_ID: &str = "gradle-bridge";
pub const STATE_DIR: &str = ".gradle-bridge";
const STATE_TAG: &str = "STATE";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// What the last successful run in a project looked like
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    pub args: Vec<String>,
    /// Seconds since the Unix epoch
    pub completed_at: u64,
}

impl BuildSummary {
    pub fn now(task: Option<String>, args: Vec<String>) -> Self {
        let completed_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        Self {
            task,
            args,
            completed_at,
        }
    }
}

/// Serialize a state file. `None` writes a file that records no state.
pub fn encode(summary: Option<&BuildSummary>, compress: bool) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    write_utf(&mut body, PLUGIN_ID)?;
    write_utf(&mut body, STATE_TAG)?;
    match summary {
        Some(summary) => {
            body.push(1);
            let payload = serde_json::to_vec(summary)?;
            let len = u32::try_from(payload.len())
                .map_err(|_| Error::StateError("state payload too large".to_string()))?;
            body.extend_from_slice(&len.to_be_bytes());
            body.extend_from_slice(&payload);
        }
        None => body.push(0),
    }

    if !compress {
        return Ok(body);
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&body)?;
    Ok(encoder.finish()?)
}

/// Parse a state file. Anything unreadable means a full rebuild, reported as `None`.
pub fn decode(bytes: &[u8]) -> Option<BuildSummary> {
    let body = if bytes.starts_with(&GZIP_MAGIC) {
        let mut body = Vec::new();
        GzDecoder::new(bytes).read_to_end(&mut body).ok()?;
        body
    } else {
        bytes.to_vec()
    };

    let mut rest = body.as_slice();
    if read_utf(&mut rest)? != PLUGIN_ID || read_utf(&mut rest)? != STATE_TAG {
        return None;
    }
    let (&has_state, tail) = rest.split_first()?;
    if has_state == 0 {
        return None;
    }
    let len = u32::from_be_bytes(tail.get(..4)?.try_into().ok()?) as usize;
    let payload = tail.get(4..4 + len)?;
    serde_json::from_slice(payload).ok()
}

fn write_utf(out: &mut Vec<u8>, text: &str) -> Result<()> {
    let len = u16::try_from(text.len())
        .map_err(|_| Error::StateError(format!("string too long for state header: {text}")))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(text.as_bytes());
    Ok(())
}

fn read_utf(input: &mut &[u8]) -> Option<String> {
    let len = u16::from_be_bytes(input.get(..2)?.try_into().ok()?) as usize;
    let text = input.get(2..2 + len)?;
    let text = std::str::from_utf8(text).ok()?.to_string();
    *input = &input[2 + len..];
    Some(text)
}

/// Reads and writes state files under `<root>/.gradle-bridge/`
#[derive(Debug, Clone)]
pub struct StateStore {
    config: StateConfig,
}

impl StateStore {
    pub fn new(config: StateConfig) -> Self {
        Self { config }
    }

    pub fn path_for(&self, root: &Path) -> PathBuf {
        root.join(STATE_DIR).join(&self.config.file_name)
    }

    pub fn load(&self, root: &Path) -> Option<BuildSummary> {
        let path = self.path_for(root);
        match std::fs::read(&path) {
            Ok(bytes) => {
                let summary = decode(&bytes);
                if summary.is_none() {
                    debug!("state file {} unusable; full rebuild", path.display());
                }
                summary
            }
            Err(_) => None,
        }
    }

    pub fn save(&self, root: &Path, summary: &BuildSummary) -> Result<()> {
        let path = self.path_for(root);
        let bytes = encode(Some(summary), self.config.compress)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        debug!("saved build state to {}", path.display());
        Ok(())
    }

    /// Save every project's state on a pool of at most `maxSaveWorkers` workers.
    ///
    /// A failing project does not stop the others; all failures are reported
    /// together once every save has finished.
    pub async fn save_all(&self, states: Vec<(PathBuf, BuildSummary)>) -> Result<usize> {
        if states.is_empty() {
            return Ok(0);
        }
        let workers = states.len().min(self.config.max_save_workers.max(1));
        let permits = Arc::new(Semaphore::new(workers));
        info!(projects = states.len(), workers, "saving build state");

        let mut saves = JoinSet::new();
        for (root, summary) in states {
            let store = self.clone();
            let permits = permits.clone();
            saves.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::StateError(e.to_string()))?;
                let display = root.display().to_string();
                tokio::task::spawn_blocking(move || store.save(&root, &summary))
                    .await
                    .map_err(|e| Error::StateError(format!("{display}: {e}")))?
                    .map_err(|e| Error::StateError(format!("{display}: {e}")))
            });
        }

        let mut saved = 0;
        let mut failures = Vec::new();
        while let Some(joined) = saves.join_next().await {
            match joined {
                Ok(Ok(())) => saved += 1,
                Ok(Err(e)) => failures.push(e.to_string()),
                Err(e) => failures.push(e.to_string()),
            }
        }

        if failures.is_empty() {
            Ok(saved)
        } else {
            warn!("{} of {} state saves failed", failures.len(), saved + failures.len());
            Err(Error::StateError(failures.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn summary() -> BuildSummary {
        BuildSummary {
            task: Some("app:test".to_string()),
            args: vec!["--tests".to_string(), "FooTest".to_string()],
            completed_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_layout_uncompressed() {
        let bytes = encode(None, false).unwrap();
        let mut expected = vec![0, 13];
        expected.extend_from_slice(b"gradle-bridge");
        expected.extend_from_slice(&[0, 5]);
        expected.extend_from_slice(b"STATE");
        expected.push(0);
        assert_eq!(bytes, expected);
        assert_eq!(decode(&bytes), None);
    }

    #[test]
    fn test_compressed_file_is_sniffed() {
        let bytes = encode(Some(&summary()), true).unwrap();
        assert_eq!(&bytes[..2], &GZIP_MAGIC);
        assert_eq!(decode(&bytes), Some(summary()));
        assert_eq!(decode(&encode(Some(&summary()), false).unwrap()), Some(summary()));
    }

    #[test]
    fn test_malformed_files_mean_full_rebuild() {
        assert_eq!(decode(b""), None);
        assert_eq!(decode(&[0x1f, 0x8b, 0, 0]), None);
        assert_eq!(decode(&[0, 3, b'f', b'o', b'o']), None);

        let mut truncated = encode(Some(&summary()), false).unwrap();
        truncated.truncate(truncated.len() - 3);
        assert_eq!(decode(&truncated), None);
    }

    #[test]
    fn test_store_round_trip_and_absent_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::new(StateConfig::default());
        assert_eq!(store.load(temp_dir.path()), None);

        store.save(temp_dir.path(), &summary()).unwrap();
        assert!(
            temp_dir
                .path()
                .join(".gradle-bridge/build-state.bin")
                .exists()
        );
        assert_eq!(store.load(temp_dir.path()), Some(summary()));
    }

    #[tokio::test]
    async fn test_save_all_aggregates_failures() {
        let temp_dir = TempDir::new().unwrap();
        let blocked = temp_dir.path().join("blocked");
        // A plain file where the state directory should go
        std::fs::create_dir_all(&blocked).unwrap();
        std::fs::write(blocked.join(STATE_DIR), b"").unwrap();

        let store = StateStore::new(StateConfig {
            max_save_workers: 2,
            ..StateConfig::default()
        });
        let mut states: Vec<(PathBuf, BuildSummary)> = (0..4)
            .map(|i| (temp_dir.path().join(format!("p{i}")), summary()))
            .collect();
        states.push((blocked.clone(), summary()));

        let err = store.save_all(states).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("blocked"));
        for i in 0..4 {
            assert!(store.load(&temp_dir.path().join(format!("p{i}"))).is_some());
        }
    }

    #[tokio::test]
    async fn test_save_all_empty() {
        let store = StateStore::new(StateConfig::default());
        assert_eq!(store.save_all(Vec::new()).await.unwrap(), 0);
    }
}
