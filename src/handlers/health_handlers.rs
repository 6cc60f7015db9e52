//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks the metadata store and disk I/O
//!
//! Both are mounted outside bearer authentication so orchestrators can probe
//! them without the API token.

use crate::services::blob_service::BlobService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

/// `GET /healthz`
///
/// Liveness probe, always 200. Performs no I/O.
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
/// Readiness probe that:
/// 1. Pings the metadata repository.
/// 2. Writes, reads back and removes a scratch file under the content directory.
///
/// HTTP 200 when all checks pass, HTTP 503 otherwise. The body only names
/// the failed step; the underlying error is logged, since the probe is
/// reachable without a token.
pub async fn readyz(State(service): State<BlobService>) -> impl IntoResponse {
    let metadata_check = match service.repository().ping().await {
        Ok(()) => (true, None::<String>),
        Err(e) => {
            warn!("readiness: metadata store ping failed: {}", e);
            (false, Some("metadata store unavailable".to_string()))
        }
    };

    let tmp_path = service
        .content_store()
        .base_path()
        .join(format!(".readyz-{}", Uuid::new_v4()));
    let disk_check = match fs::write(&tmp_path, b"readyz").await {
        Ok(_) => match fs::read(&tmp_path).await {
            Ok(bytes) if bytes == b"readyz" => match fs::remove_file(&tmp_path).await {
                Ok(_) => (true, None::<String>),
                Err(e) => {
                    warn!("readiness: could not remove {}: {}", tmp_path.display(), e);
                    (true, Some("could not remove tmp file".to_string()))
                }
            },
            Ok(_) => {
                let _ = fs::remove_file(&tmp_path).await;
                (false, Some("file content mismatch".to_string()))
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp_path).await;
                warn!("readiness: could not read {}: {}", tmp_path.display(), e);
                (false, Some("could not read tmp file".to_string()))
            }
        },
        Err(e) => {
            warn!("readiness: could not write {}: {}", tmp_path.display(), e);
            (false, Some("could not write tmp file".to_string()))
        }
    };

    let overall_ok = metadata_check.0 && disk_check.0;

    let mut checks = HashMap::new();
    checks.insert(
        "metadata",
        CheckStatus {
            ok: metadata_check.0,
            error: metadata_check.1,
        },
    );
    checks.insert(
        "disk",
        CheckStatus {
            ok: disk_check.0,
            error: disk_check.1,
        },
    );

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
