//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use std::{io, sync::Arc};
use uuid::Uuid;
use video_store::{
    errors::{StoreError, StoreResult},
    services::{
        StoreHandle, StoreSettings,
        catalog::SqliteCatalog,
        chunk_store::{ChunkStore, ChunkStream, FsChunkStore},
        memory::{MemoryCatalog, MemoryChunkStore},
    },
};

/// Deterministic, non-repeating-ish payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Split `data` into inbound segments of `segment` bytes.
pub fn inbound(
    data: &[u8],
    segment: usize,
) -> impl futures::Stream<Item = io::Result<Bytes>> + Send + use<> {
    let parts: Vec<io::Result<Bytes>> = data
        .chunks(segment)
        .map(|part| Ok(Bytes::copy_from_slice(part)))
        .collect();
    stream::iter(parts)
}

pub fn settings(chunk_size: usize) -> StoreSettings {
    StoreSettings {
        chunk_size,
        media_category: "video/".into(),
    }
}

pub struct MemoryFixture {
    pub store: StoreHandle,
    pub catalog: MemoryCatalog,
    pub chunks: MemoryChunkStore,
}

pub fn memory_store(chunk_size: usize) -> MemoryFixture {
    let catalog = MemoryCatalog::new();
    let chunks = MemoryChunkStore::new();
    let store = StoreHandle::new(
        Arc::new(catalog.clone()),
        Arc::new(chunks.clone()),
        settings(chunk_size),
    );
    MemoryFixture {
        store,
        catalog,
        chunks,
    }
}

/// SQLite catalog file + on-disk chunks inside a temp dir.
pub async fn disk_store(chunk_size: usize) -> (tempfile::TempDir, StoreHandle) {
    let dir = tempfile::tempdir().expect("create tempdir");
    let db_url = format!("sqlite://{}", dir.path().join("catalog.db").display());
    let catalog = SqliteCatalog::connect(&db_url, 4).await.expect("connect");
    catalog.migrate().await.expect("migrate");

    let chunks = FsChunkStore::new(dir.path().join("chunks"));
    chunks.init().await.expect("init chunks");

    let store = StoreHandle::new(Arc::new(catalog), Arc::new(chunks), settings(chunk_size));
    (dir, store)
}

/// Wraps a memory store and fails one chosen chunk write or read.
#[derive(Clone)]
pub struct FlakyChunks {
    pub inner: MemoryChunkStore,
    pub fail_write_at: Option<u32>,
    pub fail_read_at: Option<usize>,
}

impl FlakyChunks {
    pub fn failing_write(index: u32) -> Self {
        Self {
            inner: MemoryChunkStore::new(),
            fail_write_at: Some(index),
            fail_read_at: None,
        }
    }

    pub fn failing_read(index: usize) -> Self {
        Self {
            inner: MemoryChunkStore::new(),
            fail_write_at: None,
            fail_read_at: Some(index),
        }
    }
}

#[async_trait]
impl ChunkStore for FlakyChunks {
    async fn put_chunk(&self, object_id: Uuid, index: u32, data: Bytes) -> StoreResult<()> {
        if self.fail_write_at == Some(index) {
            return Err(StoreError::Io(io::Error::other("injected write failure")));
        }
        self.inner.put_chunk(object_id, index, data).await
    }

    async fn chunks_in_order(&self, object_id: Uuid) -> StoreResult<ChunkStream> {
        let fail_at = self.fail_read_at;
        let chunks = self.inner.chunks_in_order(object_id).await?;
        Ok(chunks
            .enumerate()
            .map(move |(i, item)| {
                if fail_at == Some(i) {
                    Err(StoreError::Io(io::Error::other("injected read failure")))
                } else {
                    item
                }
            })
            .boxed())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}

pub fn flaky_store(chunks: FlakyChunks, chunk_size: usize) -> (StoreHandle, MemoryCatalog) {
    let catalog = MemoryCatalog::new();
    let store = StoreHandle::new(
        Arc::new(catalog.clone()),
        Arc::new(chunks),
        settings(chunk_size),
    );
    (store, catalog)
}
