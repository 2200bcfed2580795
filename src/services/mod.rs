//! Storage services: the two store abstractions, their backends and the
//! per-request coordinators built on them.

pub mod catalog;
pub mod chunk_store;
pub mod memory;
pub mod streamer;
pub mod uploader;

use crate::services::{
    catalog::ObjectCatalog, chunk_store::ChunkStore, streamer::Streamer, uploader::Uploader,
};
use std::{fmt, sync::Arc};

/// Lifecycle of one upload or stream request.
///
/// `Idle -> Resolving -> {Rejected | Transferring} -> {Completed | Failed}`.
/// `Rejected`, `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Resolving,
    Rejected,
    Transferring,
    Completed,
    Failed,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Rejected => "rejected",
            Self::Transferring => "transferring",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Tunables shared by every Uploader and Streamer of a handle.
#[derive(Clone, Debug)]
pub struct StoreSettings {
    /// Bytes per chunk; the last chunk of an object may be shorter.
    pub chunk_size: usize,
    /// Content-type prefix accepted for streaming, e.g. `video/`.
    pub media_category: String,
}

impl StoreSettings {
    /// `video/` -> `video`, used as the name prefix of new objects.
    pub fn name_prefix(&self) -> &str {
        self.media_category.trim_end_matches('/')
    }
}

/// Explicitly constructed handle over one catalog and one chunk store.
///
/// Build it once at startup, pass it to the router as state, and call
/// [`StoreHandle::close`] after the server has drained.
#[derive(Clone)]
pub struct StoreHandle {
    catalog: Arc<dyn ObjectCatalog>,
    chunks: Arc<dyn ChunkStore>,
    settings: StoreSettings,
}

impl StoreHandle {
    pub fn new(
        catalog: Arc<dyn ObjectCatalog>,
        chunks: Arc<dyn ChunkStore>,
        settings: StoreSettings,
    ) -> Self {
        Self {
            catalog,
            chunks,
            settings,
        }
    }

    pub fn uploader(&self) -> Uploader {
        Uploader::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.chunks),
            self.settings.chunk_size,
            self.settings.name_prefix(),
        )
    }

    pub fn streamer(&self) -> Streamer {
        Streamer::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.chunks),
            self.settings.media_category.clone(),
        )
    }

    pub fn catalog(&self) -> &Arc<dyn ObjectCatalog> {
        &self.catalog
    }

    pub fn chunks(&self) -> &Arc<dyn ChunkStore> {
        &self.chunks
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Release backing connections.
    pub async fn close(&self) {
        self.catalog.close().await;
        tracing::info!("store handle closed");
    }
}
