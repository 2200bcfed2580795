//! Defines routes for the upload and streaming endpoints.
//!
//! ## Structure
//! - `POST /upload`              multipart upload, field `file`
//! - `GET  /stream/{filename}`   stream a committed object
//! - `GET  /healthz`, `GET /readyz`  liveness / readiness

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        object_handlers::{stream_file, upload_file},
    },
    services::StoreHandle,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the router for all endpoints.
///
/// The router carries the shared `StoreHandle` to all handlers. Upload bodies
/// are capped at `max_upload_bytes`.
pub fn routes(max_upload_bytes: usize) -> Router<StoreHandle> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/stream/{filename}", get(stream_file))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
