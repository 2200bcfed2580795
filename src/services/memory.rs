//! In-memory chunk store and catalog
//!
//! Used for testing and development. Not persistent.

use crate::{
    errors::{StoreError, StoreResult},
    models::object::{NewObject, StoredObject},
    services::{
        catalog::ObjectCatalog,
        chunk_store::{ChunkStore, ChunkStream},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    io::{self, ErrorKind},
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};
use uuid::Uuid;

#[derive(Default)]
struct ChunkInner {
    /// Chunks per object, position == index.
    objects: RwLock<HashMap<Uuid, Vec<Bytes>>>,
    reads: AtomicU64,
    writes: AtomicU64,
    open_cursors: AtomicUsize,
}

/// In-memory chunk store. Clones share the same storage.
#[derive(Clone, Default)]
pub struct MemoryChunkStore {
    inner: Arc<ChunkInner>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks held for `object_id`.
    pub fn chunk_count(&self, object_id: Uuid) -> usize {
        self.inner
            .objects
            .read()
            .get(&object_id)
            .map_or(0, Vec::len)
    }

    /// Total number of chunk reads served so far.
    pub fn reads(&self) -> u64 {
        self.inner.reads.load(Ordering::SeqCst)
    }

    /// Total number of chunk writes accepted so far.
    pub fn writes(&self) -> u64 {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Cursors opened by `chunks_in_order` and not yet dropped.
    pub fn open_cursors(&self) -> usize {
        self.inner.open_cursors.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn put_chunk(&self, object_id: Uuid, index: u32, data: Bytes) -> StoreResult<()> {
        let mut objects = self.inner.objects.write();
        let chunks = objects.entry(object_id).or_default();
        let next = chunks.len();
        let index = index as usize;
        if index < next {
            return Err(StoreError::Io(io::Error::new(
                ErrorKind::AlreadyExists,
                format!("chunk {index} of {object_id} already written"),
            )));
        }
        if index > next {
            return Err(StoreError::InvalidInput(format!(
                "chunk {index} of {object_id} written before chunk {next}"
            )));
        }
        chunks.push(data);
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn chunks_in_order(&self, object_id: Uuid) -> StoreResult<ChunkStream> {
        let count = self.chunk_count(object_id);
        if count == 0 {
            return Err(StoreError::NotFound(object_id.to_string()));
        }

        self.inner.open_cursors.fetch_add(1, Ordering::SeqCst);
        let cursor = MemoryCursor {
            inner: Arc::clone(&self.inner),
            object_id,
            next: 0,
            count,
        };
        let stream = futures::stream::unfold(cursor, |mut cursor| async move {
            if cursor.next >= cursor.count {
                return None;
            }
            let chunk = cursor
                .inner
                .objects
                .read()
                .get(&cursor.object_id)
                .and_then(|chunks| chunks.get(cursor.next).cloned());
            cursor.inner.reads.fetch_add(1, Ordering::SeqCst);
            match chunk {
                Some(bytes) => {
                    cursor.next += 1;
                    Some((Ok(bytes), cursor))
                }
                None => {
                    let err = io::Error::new(
                        ErrorKind::UnexpectedEof,
                        format!("chunk {} of {} vanished", cursor.next, cursor.object_id),
                    );
                    cursor.next = cursor.count;
                    Some((Err(StoreError::Io(err)), cursor))
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}

struct MemoryCursor {
    inner: Arc<ChunkInner>,
    object_id: Uuid,
    next: usize,
    count: usize,
}

impl Drop for MemoryCursor {
    fn drop(&mut self) {
        self.inner.open_cursors.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory catalog. Clones share the same bindings.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    entries: Arc<RwLock<HashMap<String, StoredObject>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl ObjectCatalog for MemoryCatalog {
    async fn register(&self, object: NewObject) -> StoreResult<StoredObject> {
        let mut entries = self.entries.write();
        if entries.contains_key(&object.name) {
            return Err(StoreError::DuplicateName(object.name));
        }
        let stored = object.into_stored(Utc::now());
        entries.insert(stored.name.clone(), stored.clone());
        Ok(stored)
    }

    async fn resolve(&self, name: &str) -> StoreResult<StoredObject> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
