//! HTTP handlers for uploading and streaming objects.
//! Both directions stream: upload bodies are chunked as they arrive and
//! downloads forward chunks as they are read, so no full file is buffered.

use crate::{
    errors::{AppError, INVALID_FILE_MESSAGE},
    models::object::StoredObject,
    services::StoreHandle,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use serde::Serialize;
use std::io;
use tracing::{info, warn};

/// Multipart field carrying the file.
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
}

/// `POST /upload`: multipart upload of a single `file` field.
pub async fn upload_file(
    State(store): State<StoreHandle>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(|err| {
        warn!(error = %err, "malformed multipart request");
        AppError::bad_request(INVALID_FILE_MESSAGE)
    })? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(original) = field.file_name().map(str::to_owned) else {
            warn!("file field without a filename");
            return Err(AppError::bad_request(INVALID_FILE_MESSAGE));
        };
        let content_type = field.content_type().map(str::to_owned);

        let stream = field.map_err(io::Error::other);
        let object = store
            .uploader()
            .upload(&original, content_type.as_deref(), stream)
            .await?;

        return Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                message: "File uploaded successfully".into(),
                filename: object.name,
            }),
        ));
    }

    warn!("upload request without a file field");
    Err(AppError::bad_request(INVALID_FILE_MESSAGE))
}

/// `GET /stream/{filename}`: stream an object as the response body.
///
/// A chunk failure after headers are sent surfaces as a body error, which
/// aborts the connection instead of ending the body cleanly.
pub async fn stream_file(
    State(store): State<StoreHandle>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    info!(filename = %filename, "Requesting stream for file");
    let open = store.streamer().open(&filename).await?;

    let mut response = Response::new(Body::from_stream(open.body));
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &open.object);

    Ok(response)
}

fn set_object_headers(headers: &mut HeaderMap, meta: &StoredObject) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&meta.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size()));

    let quoted = format!("\"{}\"", meta.etag);
    if let Ok(value) = HeaderValue::from_str(&quoted) {
        headers.insert(header::ETAG, value);
    }

    if let Ok(value) = HeaderValue::from_str(&meta.created_at.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
