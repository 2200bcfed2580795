//! Core data models for the chunked object store.
//!
//! Objects map to catalog rows via `sqlx::FromRow` and serialize as JSON via
//! `serde`. Chunks have no model of their own: they are opaque `Bytes`
//! addressed by `(object id, index)`.

pub mod object;
