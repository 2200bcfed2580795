use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::{fmt, io};
use thiserror::Error;

pub const INVALID_FILE_MESSAGE: &str = "Please upload a valid video file";
pub const NOT_FOUND_MESSAGE: &str = "No file exists";
pub const UPLOAD_FAILED_MESSAGE: &str = "Failed to upload file";
pub const STREAM_FAILED_MESSAGE: &str = "Failed to stream video";

/// Failures raised by the chunk store, the catalog and the coordinators
/// built on top of them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("name `{0}` is already registered")]
    DuplicateName(String),
    #[error("`{0}` not found")]
    NotFound(String),
    #[error("`{name}` has content type `{content_type}`, expected `{expected}*`")]
    UnsupportedType {
        name: String,
        content_type: String,
        expected: String,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("upload failed: {0}")]
    UploadFailed(#[source] Box<StoreError>),
    #[error("streaming failed: {0}")]
    StreamingFailed(#[source] Box<StoreError>),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn upload_failed(cause: StoreError) -> Self {
        match cause {
            already @ StoreError::UploadFailed(_) => already,
            other => StoreError::UploadFailed(Box::new(other)),
        }
    }

    pub fn streaming_failed(cause: StoreError) -> Self {
        match cause {
            already @ StoreError::StreamingFailed(_) => already,
            other => StoreError::StreamingFailed(Box::new(other)),
        }
    }
}

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "unhandled error");
        AppError::internal("Internal Server Error")
    }
}

/// Maps each store failure to a status code and a short client-facing
/// message. Details go to the log, never into the body.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidInput(_) => AppError::bad_request(INVALID_FILE_MESSAGE),
            StoreError::NotFound(_) => AppError::not_found(NOT_FOUND_MESSAGE),
            StoreError::UnsupportedType { expected, .. } => {
                AppError::bad_request(format!("Not a {} file", category_noun(&expected)))
            }
            StoreError::DuplicateName(_) => {
                AppError::new(StatusCode::CONFLICT, "File already exists")
            }
            StoreError::UploadFailed(cause) => {
                tracing::error!(error = %cause, "upload failed");
                AppError::internal(UPLOAD_FAILED_MESSAGE)
            }
            StoreError::StreamingFailed(cause) => {
                tracing::error!(error = %cause, "streaming failed");
                AppError::internal(STREAM_FAILED_MESSAGE)
            }
            other @ (StoreError::Io(_) | StoreError::Sqlx(_)) => {
                tracing::error!(error = %other, "storage error");
                AppError::internal("Internal Server Error")
            }
        }
    }
}

/// `video/` -> `video`, `image/` -> `image`.
fn category_noun(category: &str) -> &str {
    category.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (StoreError::InvalidInput("empty".into()), StatusCode::BAD_REQUEST),
            (StoreError::NotFound("a.mp4".into()), StatusCode::NOT_FOUND),
            (StoreError::DuplicateName("a.mp4".into()), StatusCode::CONFLICT),
            (
                StoreError::upload_failed(io::Error::other("disk").into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                StoreError::streaming_failed(io::Error::other("disk").into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn test_unsupported_type_message_follows_category() {
        let err = StoreError::UnsupportedType {
            name: "notes.txt".into(),
            content_type: "text/plain".into(),
            expected: "video/".into(),
        };
        let app = AppError::from(err);
        assert_eq!(app.status, StatusCode::BAD_REQUEST);
        assert_eq!(app.message, "Not a video file");

        let err = StoreError::UnsupportedType {
            name: "clip.mp4".into(),
            content_type: "video/mp4".into(),
            expected: "image/".into(),
        };
        assert_eq!(AppError::from(err).message, "Not a image file");
    }

    #[test]
    fn test_internal_details_not_leaked() {
        let err = StoreError::upload_failed(io::Error::other("/var/secret/path").into());
        let app = AppError::from(err);
        assert_eq!(app.message, UPLOAD_FAILED_MESSAGE);
    }

    #[test]
    fn test_wrappers_do_not_nest() {
        let once = StoreError::upload_failed(io::Error::other("x").into());
        let twice = StoreError::upload_failed(once);
        match twice {
            StoreError::UploadFailed(inner) => assert!(matches!(*inner, StoreError::Io(_))),
            other => panic!("unexpected {other:?}"),
        }
    }
}
