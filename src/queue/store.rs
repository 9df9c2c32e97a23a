use crate::error::{CamwatchError, Result};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// On-disk mirror of the pending queue: a JSON array of messages in FIFO order
#[derive(Debug, Clone)]
pub struct QueueStore {
    path: PathBuf,
}

impl QueueStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored messages. `Ok(None)` when no artifact exists yet.
    pub async fn read(&self) -> Result<Option<Vec<String>>> {
        let contents = match fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CamwatchError::component(
                    "queue",
                    &format!("Failed to read {}: {}", self.path.display(), e),
                ))
            }
        };

        let messages: Vec<String> = serde_json::from_slice(&contents)?;
        Ok(Some(messages))
    }

    /// Replace the artifact with `messages`.
    ///
    /// The snapshot goes to a sibling temp file which is synced and then
    /// renamed over the artifact, so readers see either the old or the new
    /// contents in full.
    pub async fn write(&self, messages: &VecDeque<String>) -> Result<()> {
        let json = serde_json::to_vec_pretty(messages)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    CamwatchError::component(
                        "queue",
                        &format!("Failed to create queue directory: {}", e),
                    )
                })?;
            }
        }

        let temp_path = self.temp_path();
        if let Err(e) = self.replace_with(&temp_path, &json).await {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        "Failed to remove temp file {}: {}",
                        temp_path.display(),
                        cleanup
                    );
                }
            }
            return Err(e);
        }

        debug!(
            "Persisted {} pending message(s) to {}",
            messages.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn replace_with(&self, temp_path: &Path, json: &[u8]) -> Result<()> {
        let mut file = File::create(temp_path).await.map_err(|e| {
            CamwatchError::component("queue", &format!("Failed to create temp file: {}", e))
        })?;

        file.write_all(json).await.map_err(|e| {
            CamwatchError::component("queue", &format!("Failed to write queue snapshot: {}", e))
        })?;

        file.sync_data().await.map_err(|e| {
            CamwatchError::component("queue", &format!("Failed to sync queue snapshot: {}", e))
        })?;
        drop(file);

        fs::rename(temp_path, &self.path).await.map_err(|e| {
            CamwatchError::component("queue", &format!("Failed to replace queue file: {}", e))
        })
    }

    /// Unique per write, so concurrent writers never share a temp file
    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
        PathBuf::from(name)
    }
}
