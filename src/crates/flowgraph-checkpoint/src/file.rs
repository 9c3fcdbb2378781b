//! JSON file checkpoint storage
//!
//! [`FileCheckpointStore`] writes one JSON document per checkpoint:
//!
//! ```text
//! <root>/
//!   order-42/
//!     v0000000001.json
//!     v0000000002.json
//!   order-43/
//!     v0000000001.json
//!   .index/
//!     <checkpoint id>        -> "order-42/v0000000002.json"
//! ```
//!
//! The `.index` entries map a checkpoint id to its file so [`load`] reads a
//! single document. Entries are written after the checkpoint itself; a
//! missing or stale entry falls back to scanning every thread, skipping
//! files that cannot be read.
//!
//! [`load`]: CheckpointStore::load
//!
//! A checkpoint is first written to a temporary file and then hard-linked to
//! its version path. Linking fails when the target already exists, so two
//! processes sharing the directory can never both claim the same version;
//! the loser sees [`CheckpointError::VersionConflict`] and the provided
//! [`CheckpointStore::append`] retries with the next version.

use crate::checkpoint::Checkpoint;
use crate::error::{CheckpointError, Result};
use crate::traits::{validate, CheckpointStore};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Checkpoint store backed by a directory of JSON files
#[derive(Debug, Clone)]
pub struct FileCheckpointStore<S> {
    root: PathBuf,
    _state: PhantomData<fn() -> S>,
}

impl<S> FileCheckpointStore<S> {
    /// Use `root` as the storage directory (created lazily)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            _state: PhantomData,
        }
    }

    /// Storage directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn thread_dir(&self, thread_id: &str) -> PathBuf {
        self.root.join(encode_name(thread_id))
    }

    fn index_entry(&self, id: &str) -> PathBuf {
        self.root.join(INDEX_DIR).join(encode_name(id))
    }

    /// Record where checkpoint `id` lives, relative to the root
    async fn write_index(&self, id: &str, relative: &str) -> Result<()> {
        let dir = self.root.join(INDEX_DIR);
        tokio::fs::create_dir_all(&dir).await?;
        let staging = dir.join(format!(".{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&staging, relative).await?;
        if let Err(e) = tokio::fs::rename(&staging, self.index_entry(id)).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Follow the index entry of `id`, `None` when it is missing or stale
    async fn load_indexed(&self, id: &str) -> Result<Option<Checkpoint<S>>>
    where
        S: DeserializeOwned,
    {
        let relative = match tokio::fs::read_to_string(self.index_entry(id)).await {
            Ok(relative) => relative,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match read_checkpoint::<S>(&self.root.join(relative.trim())).await {
            Ok(checkpoint) if checkpoint.id == id => Ok(Some(checkpoint)),
            Ok(_) => Ok(None),
            Err(CheckpointError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Look at every thread for `id`, skipping unreadable files
    async fn scan(&self, id: &str) -> Result<Option<Checkpoint<S>>>
    where
        S: DeserializeOwned,
    {
        let mut threads = match tokio::fs::read_dir(&self.root).await {
            Ok(threads) => threads,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        while let Some(thread) = threads.next_entry().await? {
            let hidden = thread.file_name().to_string_lossy().starts_with('.');
            if hidden || !thread.file_type().await?.is_dir() {
                continue;
            }
            for path in json_files(&thread.path()).await? {
                match read_checkpoint::<S>(&path).await {
                    Ok(checkpoint) if checkpoint.id == id => return Ok(Some(checkpoint)),
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping unreadable checkpoint");
                    }
                }
            }
        }
        Ok(None)
    }
}

const INDEX_DIR: &str = ".index";

/// Map an id onto a portable, collision-free file name
///
/// The result never starts with `.`, so it cannot clash with the index.
fn encode_name(id: &str) -> String {
    let mut encoded = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("_{:02x}", byte));
        }
    }
    encoded
}

fn version_file(version: u64) -> String {
    format!("v{:010}.json", version)
}

async fn read_checkpoint<S: DeserializeOwned>(path: &Path) -> Result<Checkpoint<S>> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            files.push(path);
        }
    }
    Ok(files)
}

#[async_trait]
impl<S> CheckpointStore<S> for FileCheckpointStore<S>
where
    S: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn save(&self, checkpoint: Checkpoint<S>) -> Result<()> {
        validate(&checkpoint)?;

        let dir = self.thread_dir(&checkpoint.thread_id);
        tokio::fs::create_dir_all(&dir).await?;

        let target = dir.join(version_file(checkpoint.version));
        let staging = dir.join(format!(".{}.tmp", Uuid::new_v4()));
        let body = serde_json::to_vec_pretty(&checkpoint)?;
        tokio::fs::write(&staging, body).await?;

        let linked = tokio::fs::hard_link(&staging, &target).await;
        if let Err(e) = tokio::fs::remove_file(&staging).await {
            tracing::warn!(path = %staging.display(), error = %e, "failed to remove staging file");
        }

        match linked {
            Ok(()) => {
                let relative = format!(
                    "{}/{}",
                    encode_name(&checkpoint.thread_id),
                    version_file(checkpoint.version)
                );
                if let Err(e) = self.write_index(&checkpoint.id, &relative).await {
                    tracing::warn!(checkpoint_id = %checkpoint.id, error = %e, "failed to index checkpoint");
                }
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(CheckpointError::VersionConflict {
                    thread_id: checkpoint.thread_id,
                    version: checkpoint.version,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn load(&self, id: &str) -> Result<Checkpoint<S>> {
        if let Some(checkpoint) = self.load_indexed(id).await? {
            return Ok(checkpoint);
        }
        tracing::debug!(checkpoint_id = id, "index miss, scanning threads");
        self.scan(id)
            .await?
            .ok_or_else(|| CheckpointError::NotFound(id.to_string()))
    }

    async fn list_by_thread(&self, thread_id: &str) -> Result<Vec<Checkpoint<S>>> {
        let mut checkpoints = Vec::new();
        for path in json_files(&self.thread_dir(thread_id)).await? {
            checkpoints.push(read_checkpoint::<S>(&path).await?);
        }
        checkpoints.sort_by_key(|c| c.version);
        Ok(checkpoints)
    }

    async fn delete_by_thread(&self, thread_id: &str) -> Result<()> {
        let dir = self.thread_dir(thread_id);
        let mut ids = Vec::new();
        for path in json_files(&dir).await? {
            if let Ok(checkpoint) = read_checkpoint::<S>(&path).await {
                ids.push(checkpoint.id);
            }
        }

        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if e.kind() != ErrorKind::NotFound {
                return Err(e.into());
            }
        }
        // best effort, load skips stale entries
        for id in ids {
            let _ = tokio::fs::remove_file(self.index_entry(&id)).await;
        }
        Ok(())
    }
}
