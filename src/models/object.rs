//! Represents a committed object (uploaded file) and its catalog binding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A single committed object.
///
/// Only metadata lives here; the bytes are held by the chunk store under
/// `(id, 0..chunk_count)`. Rows are write-once.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// Generated object id, also the chunk store key.
    pub id: Uuid,

    /// Unique catalog name (`{prefix}-{unix_millis}-{original_filename}`).
    pub name: String,

    /// Filename supplied by the uploader, reduced to its last path component.
    pub original_filename: String,

    /// Content type (MIME type) declared or guessed at upload time.
    pub content_type: String,

    /// Total payload size in bytes.
    pub size_bytes: i64,

    /// Number of chunks, indices `0..chunk_count`.
    pub chunk_count: i64,

    /// Hex MD5 of the whole payload.
    pub etag: String,

    /// Commit time.
    pub created_at: DateTime<Utc>,
}

/// Everything the catalog needs to commit an object.
#[derive(Clone, Debug)]
pub struct NewObject {
    pub id: Uuid,
    pub name: String,
    pub original_filename: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub chunk_count: u32,
    pub etag: String,
}

impl NewObject {
    /// Materialize the record as the catalog stores it.
    pub fn into_stored(self, created_at: DateTime<Utc>) -> StoredObject {
        StoredObject {
            id: self.id,
            name: self.name,
            original_filename: self.original_filename,
            content_type: self.content_type,
            size_bytes: self.size_bytes as i64,
            chunk_count: i64::from(self.chunk_count),
            etag: self.etag,
            created_at,
        }
    }
}

impl StoredObject {
    /// Size as an unsigned byte count.
    pub fn size(&self) -> u64 {
        self.size_bytes.max(0) as u64
    }

    /// Whether the stored content type falls under `category` (e.g. `video/`).
    pub fn is_in_category(&self, category: &str) -> bool {
        self.content_type
            .get(..category.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(category))
    }
}
