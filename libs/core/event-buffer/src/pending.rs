//! Persisted copy of the pending queue.
//!
//! The buffer rewrites the whole snapshot on every change, so a store only
//! needs `load` and `save`.

use async_trait::async_trait;
use domain_events::EventDraft;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::BufferResult;

#[async_trait]
pub trait PendingStore: Send + Sync {
    /// Drafts saved by a previous run, oldest first
    async fn load(&self) -> BufferResult<Vec<EventDraft>>;

    /// Replace the stored snapshot
    async fn save(&self, drafts: &[EventDraft]) -> BufferResult<()>;
}

/// One JSON file on local disk
pub struct FilePendingStore {
    path: PathBuf,
}

impl FilePendingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PendingStore for FilePendingStore {
    async fn load(&self) -> BufferResult<Vec<EventDraft>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save(&self, drafts: &[EventDraft]) -> BufferResult<()> {
        if drafts.is_empty() {
            return match tokio::fs::remove_file(&self.path).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Staged write; the rename is atomic on one filesystem
        let staging = self.path.with_extension("tmp");
        tokio::fs::write(&staging, serde_json::to_vec(drafts)?).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPendingStore {
    drafts: Mutex<Vec<EventDraft>>,
}

impl MemoryPendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_drafts(drafts: Vec<EventDraft>) -> Self {
        Self {
            drafts: Mutex::new(drafts),
        }
    }

    pub fn snapshot(&self) -> Vec<EventDraft> {
        self.drafts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl PendingStore for MemoryPendingStore {
    async fn load(&self) -> BufferResult<Vec<EventDraft>> {
        Ok(self.snapshot())
    }

    async fn save(&self, drafts: &[EventDraft]) -> BufferResult<()> {
        *self.drafts.lock().unwrap_or_else(|e| e.into_inner()) = drafts.to_vec();
        Ok(())
    }
}
