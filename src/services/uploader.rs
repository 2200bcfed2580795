//! Uploader: turns one inbound byte stream into a committed object.
//!
//! Chunks are written in index order and the catalog entry is created only
//! after the last one is durable, so a failed upload is never discoverable.
//! Chunks written before a failure stay behind as orphans under an object id
//! nothing refers to.

use crate::{
    errors::{StoreError, StoreResult},
    models::object::{NewObject, StoredObject},
    services::{TransferState, catalog::ObjectCatalog, chunk_store::ChunkStore},
};
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use std::{io, sync::Arc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Registration attempts before a name collision is reported.
const NAME_ATTEMPTS: usize = 3;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Clone)]
pub struct Uploader {
    catalog: Arc<dyn ObjectCatalog>,
    chunks: Arc<dyn ChunkStore>,
    chunk_size: usize,
    name_prefix: String,
}

/// What the write phase produced.
struct WrittenChunks {
    chunk_count: u32,
    size_bytes: u64,
    etag: String,
}

impl Uploader {
    pub fn new(
        catalog: Arc<dyn ObjectCatalog>,
        chunks: Arc<dyn ChunkStore>,
        chunk_size: usize,
        name_prefix: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            chunks,
            chunk_size: chunk_size.max(1),
            name_prefix: name_prefix.into(),
        }
    }

    /// Stream-upload `stream` as a new object.
    ///
    /// - Re-slices the inbound segments into `chunk_size` chunks.
    /// - Computes size and MD5 while streaming.
    /// - Registers under `{prefix}-{unix_millis}-{filename}` once every chunk
    ///   is written.
    ///
    /// Empty payloads and unusable filenames are `InvalidInput`; every other
    /// failure is reported as `UploadFailed`.
    pub async fn upload<S>(
        &self,
        original_filename: &str,
        declared_type: Option<&str>,
        stream: S,
    ) -> StoreResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let started_millis = Utc::now().timestamp_millis();
        debug!(filename = original_filename, state = %TransferState::Resolving, "upload requested");

        let original = match sanitize_filename(original_filename) {
            Ok(name) => name,
            Err(err) => {
                warn!(filename = original_filename, state = %TransferState::Rejected, "{err}");
                return Err(err);
            }
        };
        let content_type = resolve_content_type(declared_type, &original);
        let object_id = Uuid::new_v4();
        debug!(%object_id, filename = %original, %content_type, state = %TransferState::Transferring, "writing chunks");

        let written = match self.write_chunks(object_id, stream).await {
            Ok(written) => written,
            Err(err) => {
                error!(%object_id, error = %err, state = %TransferState::Failed, "upload aborted, object not registered");
                return Err(StoreError::upload_failed(err));
            }
        };

        if written.chunk_count == 0 {
            warn!(filename = %original, state = %TransferState::Rejected, "empty upload rejected");
            return Err(StoreError::InvalidInput("empty upload".into()));
        }

        let object = self
            .commit(object_id, started_millis, original, content_type, written)
            .await
            .map_err(|err| {
                error!(%object_id, error = %err, state = %TransferState::Failed, "registration failed");
                StoreError::upload_failed(err)
            })?;

        info!(
            %object_id,
            name = %object.name,
            chunks = object.chunk_count,
            bytes = object.size_bytes,
            state = %TransferState::Completed,
            "upload committed"
        );
        Ok(object)
    }

    async fn write_chunks<S>(&self, object_id: Uuid, stream: S) -> StoreResult<WrittenChunks>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        pin_mut!(stream);

        let mut pending = BytesMut::with_capacity(self.chunk_size);
        let mut digest = md5::Context::new();
        let mut index: u32 = 0;
        let mut size_bytes: u64 = 0;

        while let Some(segment) = stream.next().await {
            let segment = segment?;
            size_bytes += segment.len() as u64;
            digest.consume(&segment);
            pending.extend_from_slice(&segment);

            while pending.len() >= self.chunk_size {
                let chunk = pending.split_to(self.chunk_size).freeze();
                self.chunks.put_chunk(object_id, index, chunk).await?;
                index += 1;
            }
        }

        if !pending.is_empty() {
            self.chunks
                .put_chunk(object_id, index, pending.freeze())
                .await?;
            index += 1;
        }

        Ok(WrittenChunks {
            chunk_count: index,
            size_bytes,
            etag: format!("{:x}", digest.compute()),
        })
    }

    /// Register the object, re-deriving the name with a random
    /// disambiguator if the timestamped one is already taken.
    async fn commit(
        &self,
        object_id: Uuid,
        millis: i64,
        original: String,
        content_type: String,
        written: WrittenChunks,
    ) -> StoreResult<StoredObject> {
        let mut attempt = 0;
        loop {
            let disambiguator = (attempt > 0).then(short_token);
            let name = derive_name(&self.name_prefix, millis, &original, disambiguator.as_deref());
            let object = NewObject {
                id: object_id,
                name,
                original_filename: original.clone(),
                content_type: content_type.clone(),
                size_bytes: written.size_bytes,
                chunk_count: written.chunk_count,
                etag: written.etag.clone(),
            };

            match self.catalog.register(object).await {
                Ok(stored) => return Ok(stored),
                Err(StoreError::DuplicateName(name)) if attempt + 1 < NAME_ATTEMPTS => {
                    warn!(%name, attempt, "name already registered, deriving another");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// `video-1700000000000-clip.mp4`, or `video-1700000000000-1a2b3c4d-clip.mp4`
/// when a disambiguator is needed.
pub fn derive_name(prefix: &str, millis: i64, original: &str, disambiguator: Option<&str>) -> String {
    match disambiguator {
        Some(token) => format!("{prefix}-{millis}-{token}-{original}"),
        None => format!("{prefix}-{millis}-{original}"),
    }
}

fn short_token() -> String {
    let mut token = Uuid::new_v4().simple().to_string();
    token.truncate(8);
    token
}

/// Reduce a client-supplied filename to its last path component.
pub fn sanitize_filename(raw: &str) -> StoreResult<String> {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if last.is_empty() || last == "." || last == ".." {
        return Err(StoreError::InvalidInput(format!("unusable filename `{raw}`")));
    }
    if last.chars().any(char::is_control) {
        return Err(StoreError::InvalidInput(
            "filename contains control characters".into(),
        ));
    }
    Ok(last.to_string())
}

/// Declared type unless absent or generic, then a guess from the extension.
pub fn resolve_content_type(declared: Option<&str>, filename: &str) -> String {
    let declared = declared
        .map(str::trim)
        .filter(|ct| !ct.is_empty() && !ct.eq_ignore_ascii_case(FALLBACK_CONTENT_TYPE));
    if let Some(ct) = declared {
        return ct.to_string();
    }
    mime_guess::from_path(filename)
        .first()
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::{MemoryCatalog, MemoryChunkStore};
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn segments(parts: &[&[u8]]) -> impl Stream<Item = io::Result<Bytes>> {
        let owned: Vec<io::Result<Bytes>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p)))
            .collect();
        stream::iter(owned)
    }

    fn uploader(chunk_size: usize) -> (Uploader, MemoryCatalog, MemoryChunkStore) {
        let catalog = MemoryCatalog::new();
        let chunks = MemoryChunkStore::new();
        let uploader = Uploader::new(
            Arc::new(catalog.clone()),
            Arc::new(chunks.clone()),
            chunk_size,
            "video",
        );
        (uploader, catalog, chunks)
    }

    #[test]
    fn test_derive_name() {
        assert_eq!(
            derive_name("video", 1700000000000, "clip.mp4", None),
            "video-1700000000000-clip.mp4"
        );
        assert_eq!(
            derive_name("video", 5, "clip.mp4", Some("abcd1234")),
            "video-5-abcd1234-clip.mp4"
        );
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("clip.mp4").unwrap(), "clip.mp4");
        assert_eq!(sanitize_filename("../../etc/clip.mp4").unwrap(), "clip.mp4");
        assert_eq!(sanitize_filename("C:\\videos\\clip.mp4").unwrap(), "clip.mp4");
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("dir/").is_err());
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename("a\nb.mp4").is_err());
    }

    #[test]
    fn test_resolve_content_type() {
        assert_eq!(resolve_content_type(Some("video/webm"), "x.mp4"), "video/webm");
        assert_eq!(
            resolve_content_type(Some("application/octet-stream"), "x.mp4"),
            "video/mp4"
        );
        assert_eq!(resolve_content_type(None, "notes.txt"), "text/plain");
        assert_eq!(
            resolve_content_type(None, "blob.unknownext"),
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn test_reslices_into_fixed_chunks() {
        let (uploader, catalog, chunks) = uploader(4);
        let object = uploader
            .upload("a.mp4", Some("video/mp4"), segments(&[b"abc", b"defgh", b"ij"]))
            .await
            .unwrap();

        assert_eq!(object.chunk_count, 3);
        assert_eq!(object.size_bytes, 10);
        assert_eq!(object.etag, format!("{:x}", md5::compute(b"abcdefghij")));
        assert_eq!(chunks.chunk_count(object.id), 3);
        assert_eq!(catalog.resolve(&object.name).await.unwrap(), object);

        let stored: Vec<Bytes> = chunks
            .chunks_in_order(object.id)
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(stored, vec![
            Bytes::from_static(b"abcd"),
            Bytes::from_static(b"efgh"),
            Bytes::from_static(b"ij"),
        ]);
    }

    #[tokio::test]
    async fn test_empty_upload_rejected_without_writes() {
        let (uploader, catalog, chunks) = uploader(4);
        let result = uploader
            .upload("a.mp4", None, segments(&[b"", b""]))
            .await;

        assert!(matches!(result, Err(StoreError::InvalidInput(_))));
        assert_eq!(chunks.writes(), 0);
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn test_inbound_error_aborts() {
        let (uploader, catalog, _chunks) = uploader(2);
        let inbound = stream::iter(vec![
            Ok(Bytes::from_static(b"abcd")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
        ]);
        let result = uploader.upload("a.mp4", None, inbound).await;

        assert!(matches!(result, Err(StoreError::UploadFailed(_))));
        assert!(catalog.is_empty());
    }

    /// Reports the first `collisions` registrations as duplicates.
    struct CollidingCatalog {
        inner: MemoryCatalog,
        collisions: usize,
        seen: AtomicUsize,
    }

    #[async_trait]
    impl ObjectCatalog for CollidingCatalog {
        async fn register(&self, object: NewObject) -> StoreResult<StoredObject> {
            if self.seen.fetch_add(1, Ordering::SeqCst) < self.collisions {
                return Err(StoreError::DuplicateName(object.name));
            }
            self.inner.register(object).await
        }

        async fn resolve(&self, name: &str) -> StoreResult<StoredObject> {
            self.inner.resolve(name).await
        }

        async fn health_check(&self) -> StoreResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_name_collision_retried_with_disambiguator() {
        let catalog = Arc::new(CollidingCatalog {
            inner: MemoryCatalog::new(),
            collisions: 1,
            seen: AtomicUsize::new(0),
        });
        let uploader = Uploader::new(catalog.clone(), Arc::new(MemoryChunkStore::new()), 8, "video");

        let object = uploader
            .upload("clip.mp4", None, segments(&[b"payload"]))
            .await
            .unwrap();

        // video-{millis}-{token}-clip.mp4
        let parts: Vec<&str> = object.name.splitn(4, '-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "video");
        assert_eq!(parts[2].len(), 8);
        assert_eq!(parts[3], "clip.mp4");
        assert_eq!(catalog.seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_persistent_collision_fails_upload() {
        let catalog = Arc::new(CollidingCatalog {
            inner: MemoryCatalog::new(),
            collisions: usize::MAX,
            seen: AtomicUsize::new(0),
        });
        let uploader = Uploader::new(catalog.clone(), Arc::new(MemoryChunkStore::new()), 8, "video");

        let result = uploader.upload("clip.mp4", None, segments(&[b"payload"])).await;
        match result {
            Err(StoreError::UploadFailed(inner)) => {
                assert!(matches!(*inner, StoreError::DuplicateName(_)))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(catalog.seen.load(Ordering::SeqCst), NAME_ATTEMPTS);
    }
}
