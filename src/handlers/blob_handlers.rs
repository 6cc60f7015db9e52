//! HTTP handlers for blob operations.
//! Streams bodies in both directions and delegates storage concerns to
//! `BlobService`. The blob's pathname is the request path itself.

use crate::{
    errors::AppError,
    models::blob::BlobMetadata,
    services::blob_service::{BlobError, BlobService, DeleteOutcome},
};
use axum::{
    Json,
    body::Body,
    extract::{FromRequest, Multipart, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde_json::json;
use std::io;
use tokio_util::io::ReaderStream;

const CACHE_CONTROL: &str = "public, max-age=0, must-revalidate";

/// `GET /api/blobs` — every metadata record as a JSON array.
pub async fn list_blobs(
    State(service): State<BlobService>,
) -> Result<Json<Vec<BlobMetadata>>, AppError> {
    Ok(Json(service.list().await?))
}

/// `POST {pathname}` — store the request payload at `pathname`.
///
/// Accepts `multipart/form-data` with a `file` field, or a raw body whose
/// `Content-Type` is recorded as the blob's type.
pub async fn upload_blob(
    State(service): State<BlobService>,
    req: Request,
) -> Result<impl IntoResponse, AppError> {
    let pathname = req.uri().path().to_string();
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let stored = if content_type.as_deref().is_some_and(is_multipart) {
        let multipart = Multipart::from_request(req, &())
            .await
            .map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
        upload_multipart(&service, &pathname, multipart).await?
    } else {
        let stream = req
            .into_body()
            .into_data_stream()
            .map(|chunk| chunk.map_err(io::Error::other));
        service
            .upload(&pathname, stream, content_type.as_deref())
            .await?
    };

    Ok((StatusCode::CREATED, Json(stored)))
}

async fn upload_multipart(
    service: &BlobService,
    pathname: &str,
    mut multipart: Multipart,
) -> Result<BlobMetadata, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let declared = field.content_type().map(str::to_string);
        let stream = field.map(|chunk| chunk.map_err(io::Error::other));
        return Ok(service.upload(pathname, stream, declared.as_deref()).await?);
    }

    Err(AppError::bad_request("multipart body has no `file` field"))
}

/// `GET {pathname}` — stream the blob, or 304 when the client's copy is current.
pub async fn get_blob(
    State(service): State<BlobService>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let pathname = uri.path();
    let reader = service
        .get(pathname)
        .await?
        .ok_or_else(|| BlobError::NotFound(pathname.to_string()))?;

    if etag_matches(&headers, &reader.metadata.etag()) {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NOT_MODIFIED;
        set_validator_headers(response.headers_mut(), &reader.metadata);
        return Ok(response);
    }

    let body = Body::from_stream(ReaderStream::new(reader.file));
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_blob_headers(response.headers_mut(), &reader.metadata);

    Ok(response)
}

/// `HEAD {pathname}` — same headers as GET but no body.
pub async fn head_blob(
    State(service): State<BlobService>,
    uri: Uri,
) -> Result<Response, AppError> {
    let pathname = uri.path();
    let meta = service
        .metadata(pathname)
        .await?
        .ok_or_else(|| BlobError::NotFound(pathname.to_string()))?;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_blob_headers(response.headers_mut(), &meta);

    Ok(response)
}

/// `DELETE {pathname}` — remove metadata, then content.
///
/// A record whose content had already vanished is reported as 404 even
/// though the record itself is now gone.
pub async fn delete_blob(
    State(service): State<BlobService>,
    uri: Uri,
) -> Result<Response, AppError> {
    let pathname = uri.path();
    match service.delete(pathname).await? {
        DeleteOutcome::Deleted => {
            Ok((StatusCode::OK, Json(json!({ "deleted": pathname }))).into_response())
        }
        DeleteOutcome::NotFound | DeleteOutcome::ContentMissing => {
            Err(BlobError::NotFound(pathname.to_string()).into())
        }
    }
}

fn is_multipart(content_type: &str) -> bool {
    content_type
        .get(..19)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("multipart/form-data"))
}

/// True when any entity tag in `If-None-Match` matches `etag` (or is `*`).
fn etag_matches(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .any(|candidate| {
            candidate == "*" || candidate == etag || candidate.strip_prefix("W/") == Some(etag)
        })
}

fn set_validator_headers(headers: &mut HeaderMap, meta: &BlobMetadata) {
    if let Ok(value) = HeaderValue::from_str(&meta.etag()) {
        headers.insert(header::ETAG, value);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(CACHE_CONTROL),
    );
    let http_date = meta
        .uploaded_at
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    if let Ok(value) = HeaderValue::from_str(&http_date) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}

fn set_blob_headers(headers: &mut HeaderMap, meta: &BlobMetadata) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&meta.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(meta.size.max(0) as u64),
    );
    set_validator_headers(headers, meta);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_multipart_content_type() {
        assert!(is_multipart("multipart/form-data; boundary=abc"));
        assert!(is_multipart("Multipart/Form-Data; boundary=abc"));
        assert!(!is_multipart("text/plain"));
        assert!(!is_multipart("multipart/mixed"));
    }

    #[test]
    fn if_none_match_handles_lists_weak_tags_and_wildcard() {
        let etag = "\"5-1a\"";
        let mut headers = HeaderMap::new();
        assert!(!etag_matches(&headers, etag));

        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"x\", \"5-1a\""));
        assert!(etag_matches(&headers, etag));

        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("W/\"5-1a\""));
        assert!(etag_matches(&headers, etag));

        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("*"));
        assert!(etag_matches(&headers, etag));

        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"5-1b\""));
        assert!(!etag_matches(&headers, etag));
    }
}
