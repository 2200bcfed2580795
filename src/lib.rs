//! Chunked object store for large media uploads.
//!
//! Uploads are sliced into fixed-size chunks and committed to a catalog only
//! once every chunk is durable; downloads stream chunks back in order without
//! buffering whole files.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
