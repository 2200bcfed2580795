//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that probes the catalog and the chunk store

use crate::services::StoreHandle;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

/// `GET /healthz`
///
/// Very small liveness probe. Always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Runs the catalog probe and the chunk store probe. HTTP 200 when both pass,
/// HTTP 503 when any fails.
pub async fn readyz(State(store): State<StoreHandle>) -> impl IntoResponse {
    let catalog = match store.catalog().health_check().await {
        Ok(()) => CheckStatus::ok(),
        Err(err) => CheckStatus::failed(err),
    };
    let chunks = match store.chunks().health_check().await {
        Ok(()) => CheckStatus::ok(),
        Err(err) => CheckStatus::failed(err),
    };

    let overall_ok = catalog.ok && chunks.ok;
    let mut checks = HashMap::new();
    checks.insert("catalog", catalog);
    checks.insert("chunks", chunks);

    let body = ReadyResponse {
        status: if overall_ok { "ok" } else { "error" }.into(),
        checks,
    };
    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(err: impl std::fmt::Display) -> Self {
        tracing::warn!(error = %err, "readiness check failed");
        Self {
            ok: false,
            error: Some(format!("error: {}", err)),
        }
    }
}
