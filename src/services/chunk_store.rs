//! src/services/chunk_store.rs
//!
//! ChunkStore: durable storage of opaque byte chunks keyed by
//! `(object id, index)`, plus the on-disk implementation. Chunk payloads
//! live beneath `base_path/{shard}/{shard}/{object_id}/{index}.chunk`.

use crate::errors::{StoreError, StoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream::BoxStream};
use std::{
    io::{self, ErrorKind},
    path::PathBuf,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

/// Lazy, ordered sequence of chunk payloads for one object.
///
/// Finite and not restartable; the underlying cursor is released when the
/// stream is dropped, whether it ran to the end or not.
pub type ChunkStream = BoxStream<'static, StoreResult<Bytes>>;

const CHUNK_EXT: &str = "chunk";

#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Durably write chunk `index` of `object_id`.
    ///
    /// Append-only: an index that already exists is rejected with an
    /// `AlreadyExists` I/O error.
    async fn put_chunk(&self, object_id: Uuid, index: u32, data: Bytes) -> StoreResult<()>;

    /// Open a cursor over chunks `0, 1, 2, ...` of `object_id`.
    ///
    /// Returns `NotFound` when no chunk exists for the id. A read failure
    /// partway is yielded as a single error item, after which the stream ends.
    async fn chunks_in_order(&self, object_id: Uuid) -> StoreResult<ChunkStream>;

    /// Cheap readiness probe.
    async fn health_check(&self) -> StoreResult<()>;
}

/// Chunk store backed by the local filesystem.
#[derive(Clone, Debug)]
pub struct FsChunkStore {
    /// Base directory on disk where chunk payloads are stored.
    base_path: PathBuf,
}

impl FsChunkStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Create the base directory if missing.
    pub async fn init(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        Ok(())
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    /// Two-level shard identifiers for an object id.
    ///
    /// First two bytes of MD5(object_id) as lowercase hex (00–ff). Keeps the
    /// number of entries per directory small.
    fn object_shards(object_id: Uuid) -> (String, String) {
        let digest = md5::compute(object_id.as_bytes());
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_dir(&self, object_id: Uuid) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(object_id);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(object_id.to_string());
        path
    }

    fn chunk_path(dir: &std::path::Path, index: u32) -> PathBuf {
        dir.join(format!("{index:08}.{CHUNK_EXT}"))
    }

    /// Number of committed chunk files in an object directory.
    async fn count_chunks(dir: &std::path::Path) -> io::Result<u32> {
        let mut entries = fs::read_dir(dir).await?;
        let mut count = 0u32;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == CHUNK_EXT) {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl ChunkStore for FsChunkStore {
    /// Writes go to a temp file that is fsynced and then renamed into place,
    /// so a chunk is either fully present or absent.
    async fn put_chunk(&self, object_id: Uuid, index: u32, data: Bytes) -> StoreResult<()> {
        let dir = self.object_dir(object_id);
        fs::create_dir_all(&dir).await?;

        let final_path = Self::chunk_path(&dir, index);
        if fs::try_exists(&final_path).await? {
            return Err(StoreError::Io(io::Error::new(
                ErrorKind::AlreadyExists,
                format!("chunk {index} of {object_id} already written"),
            )));
        }

        let tmp_path = dir.join(format!(".tmp-{}", Uuid::new_v4()));
        let written = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(&data).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &final_path).await
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        debug!(%object_id, index, bytes = data.len(), "chunk written");
        Ok(())
    }

    async fn chunks_in_order(&self, object_id: Uuid) -> StoreResult<ChunkStream> {
        let dir = self.object_dir(object_id);
        let count = match Self::count_chunks(&dir).await {
            Ok(0) => return Err(StoreError::NotFound(object_id.to_string())),
            Ok(count) => count,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(object_id.to_string()));
            }
            Err(err) => return Err(StoreError::Io(err)),
        };

        let cursor = FsCursor {
            object_id,
            dir,
            next: 0,
            count,
            failed: false,
        };
        let stream = futures::stream::unfold(cursor, |mut cursor| async move {
            if cursor.failed || cursor.next >= cursor.count {
                return None;
            }
            let path = FsChunkStore::chunk_path(&cursor.dir, cursor.next);
            match fs::read(&path).await {
                Ok(bytes) => {
                    cursor.next += 1;
                    Some((Ok(Bytes::from(bytes)), cursor))
                }
                Err(err) => {
                    cursor.failed = true;
                    Some((Err(StoreError::Io(err)), cursor))
                }
            }
        });
        Ok(stream.boxed())
    }

    /// Write/read/delete a probe file under `base_path`.
    async fn health_check(&self) -> StoreResult<()> {
        let probe = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&probe, b"readyz").await?;
        let read_back = fs::read(&probe).await;
        let _ = fs::remove_file(&probe).await;
        if read_back? != b"readyz" {
            return Err(StoreError::Io(io::Error::other("probe content mismatch")));
        }
        Ok(())
    }
}

/// Read position over one object's chunk files.
struct FsCursor {
    object_id: Uuid,
    dir: PathBuf,
    next: u32,
    count: u32,
    failed: bool,
}

impl Drop for FsCursor {
    fn drop(&mut self) {
        debug!(
            object_id = %self.object_id,
            read = self.next,
            total = self.count,
            "chunk cursor closed"
        );
    }
}
