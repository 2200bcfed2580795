//! Streamer: resolves a name and forwards the object's chunks in order.
//!
//! Rejections (unknown name, wrong media category) happen before any chunk
//! is read. Once transferring, a failed chunk read or a short object ends the
//! stream with a single `StreamingFailed` item, never with a clean end.

use crate::{
    errors::{StoreError, StoreResult},
    models::object::StoredObject,
    services::{
        TransferState,
        catalog::ObjectCatalog,
        chunk_store::{ChunkStore, ChunkStream},
    },
};
use bytes::Bytes;
use futures::{StreamExt, stream::BoxStream};
use std::{io, sync::Arc};
use tracing::{debug, error, info, warn};

/// Body of an open transfer.
pub type ObjectBody = BoxStream<'static, StoreResult<Bytes>>;

/// An object that passed resolution and validation, with its lazy body.
pub struct OpenObject {
    pub object: StoredObject,
    pub body: ObjectBody,
}

#[derive(Clone)]
pub struct Streamer {
    catalog: Arc<dyn ObjectCatalog>,
    chunks: Arc<dyn ChunkStore>,
    media_category: String,
}

impl Streamer {
    pub fn new(
        catalog: Arc<dyn ObjectCatalog>,
        chunks: Arc<dyn ChunkStore>,
        media_category: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            chunks,
            media_category: media_category.into(),
        }
    }

    pub fn media_category(&self) -> &str {
        &self.media_category
    }

    /// Resolve `name`, validate its content type and open its chunk cursor.
    ///
    /// Errors returned here happen before the first byte; errors after that
    /// arrive as items of the returned body.
    pub async fn open(&self, name: &str) -> StoreResult<OpenObject> {
        debug!(name, state = %TransferState::Resolving, "stream requested");

        let object = match self.catalog.resolve(name).await {
            Ok(object) => object,
            Err(err @ StoreError::NotFound(_)) => {
                warn!(name, state = %TransferState::Rejected, "no such object");
                return Err(err);
            }
            Err(err) => {
                error!(name, error = %err, state = %TransferState::Failed, "catalog lookup failed");
                return Err(err);
            }
        };

        if !object.is_in_category(&self.media_category) {
            warn!(
                name,
                content_type = %object.content_type,
                expected = %self.media_category,
                state = %TransferState::Rejected,
                "content type outside media category"
            );
            return Err(StoreError::UnsupportedType {
                name: object.name,
                content_type: object.content_type,
                expected: self.media_category.clone(),
            });
        }

        let chunks = self.chunks.chunks_in_order(object.id).await.map_err(|err| {
            error!(name, object_id = %object.id, error = %err, state = %TransferState::Failed, "could not open chunks");
            StoreError::streaming_failed(err)
        })?;

        debug!(
            name,
            object_id = %object.id,
            chunks = object.chunk_count,
            bytes = object.size_bytes,
            state = %TransferState::Transferring,
            "streaming"
        );

        let transfer = Transfer {
            name: object.name.clone(),
            chunks,
            expected: object.size(),
            sent: 0,
            state: TransferState::Transferring,
        };
        Ok(OpenObject {
            object,
            body: transfer.into_body(),
        })
    }
}

/// Per-request forwarding state. Owns the chunk cursor, so dropping the body
/// (e.g. on client disconnect) stops all further chunk reads.
struct Transfer {
    name: String,
    chunks: ChunkStream,
    expected: u64,
    sent: u64,
    state: TransferState,
}

impl Transfer {
    fn into_body(self) -> ObjectBody {
        futures::stream::unfold(self, |mut transfer| async move {
            if transfer.state != TransferState::Transferring {
                return None;
            }
            match transfer.chunks.next().await {
                Some(Ok(chunk)) => {
                    transfer.sent += chunk.len() as u64;
                    if transfer.sent > transfer.expected {
                        let err = io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!(
                                "object longer than recorded size ({} > {})",
                                transfer.sent, transfer.expected
                            ),
                        );
                        return Some((Err(transfer.fail(err.into())), transfer));
                    }
                    Some((Ok(chunk), transfer))
                }
                Some(Err(err)) => Some((Err(transfer.fail(err)), transfer)),
                None if transfer.sent < transfer.expected => {
                    let err = io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "chunks ended after {} of {} bytes",
                            transfer.sent, transfer.expected
                        ),
                    );
                    Some((Err(transfer.fail(err.into())), transfer))
                }
                None => {
                    transfer.state = TransferState::Completed;
                    info!(
                        name = %transfer.name,
                        bytes = transfer.sent,
                        state = %TransferState::Completed,
                        "streaming finished"
                    );
                    None
                }
            }
        })
        .boxed()
    }

    fn fail(&mut self, cause: StoreError) -> StoreError {
        self.state = TransferState::Failed;
        error!(
            name = %self.name,
            sent = self.sent,
            expected = self.expected,
            error = %cause,
            state = %TransferState::Failed,
            "streaming aborted"
        );
        StoreError::streaming_failed(cause)
    }
}

impl Drop for Transfer {
    fn drop(&mut self) {
        if self.state == TransferState::Transferring {
            debug!(
                name = %self.name,
                sent = self.sent,
                expected = self.expected,
                "consumer went away, transfer cancelled"
            );
        }
    }
}
