//! Defines routes for the blob API.
//!
//! ## Structure
//! - **Probes** (no authentication)
//!   - `GET    /healthz`
//!   - `GET    /readyz`
//!
//! - **Blob endpoints** (bearer token required)
//!   - `GET    /api/blobs`   — list metadata for every blob
//!   - `POST   /{*pathname}` — upload
//!   - `GET    /{*pathname}` — download
//!   - `HEAD   /{*pathname}` — headers only
//!   - `DELETE /{*pathname}` — delete
//!
//! The wildcard lets a pathname span directories, e.g. `/photos/2025/img.jpg`.

use crate::{
    handlers::{
        auth::{BearerToken, require_bearer},
        blob_handlers::{delete_blob, get_blob, head_blob, list_blobs, upload_blob},
        health_handlers::{healthz, readyz},
    },
    services::blob_service::BlobService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};

/// Build the router. Handlers share the `BlobService` state.
///
/// Upload size is enforced by the content store while streaming, so axum's
/// default body limit is switched off.
pub fn routes(token: BearerToken) -> Router<BlobService> {
    let blobs = Router::new()
        .route("/api/blobs", get(list_blobs))
        .route(
            "/{*pathname}",
            post(upload_blob)
                .get(get_blob)
                .head(head_blob)
                .delete(delete_blob),
        )
        .layer(middleware::from_fn_with_state(token, require_bearer));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .merge(blobs)
        .layer(DefaultBodyLimit::disable())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::blob::BlobMetadata, repository::memory::InMemoryMetadataRepository,
        services::path_sanitizer::PathPolicy,
    };
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode, header},
        response::Response,
    };
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const TOKEN: &str = "test-token";
    const LIMIT: u64 = 64;

    fn app() -> (Router, TempDir) {
        let dir = TempDir::new().unwrap();
        let service = BlobService::new(
            Arc::new(InMemoryMetadataRepository::new()),
            dir.path(),
            PathPolicy::default(),
            LIMIT,
        );
        (routes(BearerToken::new(TOKEN)).with_state(service), dir)
    }

    fn request(method: Method, uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn body_bytes(resp: Response) -> Vec<u8> {
        resp.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    async fn upload(app: &Router, uri: &str, data: &'static [u8], content_type: &str) -> Response {
        let req = request(Method::POST, uri)
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(data))
            .unwrap();
        send(app, req).await
    }

    #[tokio::test]
    async fn rejects_missing_or_wrong_token() {
        let (app, _dir) = app();

        let req = Request::builder()
            .uri("/api/blobs")
            .body(Body::empty())
            .unwrap();
        let resp = send(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.headers()[header::WWW_AUTHENTICATE], "Bearer");

        let req = Request::builder()
            .uri("/a.txt")
            .header(header::AUTHORIZATION, "Bearer nope")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .method(Method::POST)
            .uri("/a.txt")
            .header(header::AUTHORIZATION, format!("Basic {}", TOKEN))
            .body(Body::from("x"))
            .unwrap();
        assert_eq!(send(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn probes_do_not_need_a_token() {
        let (app, _dir) = app();

        let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
        assert_eq!(send(&app, req).await.status(), StatusCode::OK);

        let req = Request::builder().uri("/readyz").body(Body::empty()).unwrap();
        let resp = send(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["checks"]["disk"]["ok"], true);
    }

    #[tokio::test]
    async fn readyz_hides_repository_error_detail() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(InMemoryMetadataRepository::new());
        let service = BlobService::new(repo.clone(), dir.path(), PathPolicy::default(), LIMIT);
        let app = routes(BearerToken::new(TOKEN)).with_state(service);
        repo.fail_pings(true);

        let req = Request::builder().uri("/readyz").body(Body::empty()).unwrap();
        let resp = send(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let raw = body_bytes(resp).await;
        let text = String::from_utf8_lossy(&raw).to_lowercase();
        assert!(!text.contains("pool"), "{}", text);
        assert!(!text.contains("sqlx"), "{}", text);

        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["checks"]["metadata"]["ok"], false);
        assert_eq!(json["checks"]["metadata"]["error"], "metadata store unavailable");
        assert_eq!(json["checks"]["disk"]["ok"], true);
    }

    #[tokio::test]
    async fn upload_get_list_delete_flow() {
        let (app, _dir) = app();

        let resp = upload(&app, "/a/b.txt", b"hello", "text/plain").await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let stored: BlobMetadata = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(stored.pathname, "/a/b.txt");
        assert_eq!(stored.size, 5);

        let resp = send(&app, request(Method::GET, "/a/b.txt").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(resp.headers()[header::CONTENT_LENGTH], "5");
        assert_eq!(
            resp.headers()[header::ETAG].to_str().unwrap(),
            stored.etag()
        );
        assert!(resp.headers().contains_key(header::CACHE_CONTROL));
        assert_eq!(body_bytes(resp).await, b"hello");

        let resp = send(&app, request(Method::GET, "/api/blobs").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let listed: Vec<BlobMetadata> = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(listed, vec![stored]);

        let resp = send(&app, request(Method::DELETE, "/a/b.txt").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = send(&app, request(Method::DELETE, "/a/b.txt").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = send(&app, request(Method::GET, "/a/b.txt").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn overwrite_returns_latest_bytes() {
        let (app, _dir) = app();
        upload(&app, "/v.txt", b"version-a", "text/plain").await;
        upload(&app, "/v.txt", b"b", "text/csv").await;

        let resp = send(&app, request(Method::GET, "/v.txt").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/csv");
        assert_eq!(body_bytes(resp).await, b"b");

        let resp = send(&app, request(Method::GET, "/api/blobs").body(Body::empty()).unwrap()).await;
        let listed: Vec<BlobMetadata> = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn conditional_get_returns_not_modified() {
        let (app, _dir) = app();
        upload(&app, "/c.txt", b"cached", "text/plain").await;

        let resp = send(&app, request(Method::GET, "/c.txt").body(Body::empty()).unwrap()).await;
        let etag = resp.headers()[header::ETAG].clone();

        let req = request(Method::GET, "/c.txt")
            .header(header::IF_NONE_MATCH, etag.clone())
            .body(Body::empty())
            .unwrap();
        let resp = send(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(resp.headers()[header::ETAG], etag);
        assert!(body_bytes(resp).await.is_empty());
    }

    #[tokio::test]
    async fn head_returns_headers_only() {
        let (app, _dir) = app();
        upload(&app, "/h.json", b"{}", "application/json").await;

        let resp = send(&app, request(Method::HEAD, "/h.json").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(resp.headers()[header::CONTENT_LENGTH], "2");

        let resp = send(&app, request(Method::HEAD, "/nope.json").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn multipart_upload_uses_file_field_type() {
        let (app, _dir) = app();
        let boundary = "----blobbunnyboundary";
        let body = format!(
            "--{b}\r\n\
             Content-Disposition: form-data; name=\"note\"\r\n\r\n\
             ignored\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"pic.png\"\r\n\
             Content-Type: image/png\r\n\r\n\
             PNGDATA\r\n\
             --{b}--\r\n",
            b = boundary
        );
        let req = request(Method::POST, "/img/pic.png")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap();
        let resp = send(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let stored: BlobMetadata = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(stored.content_type, "image/png");
        assert_eq!(stored.size, 7);

        let resp = send(&app, request(Method::GET, "/img/pic.png").body(Body::empty()).unwrap()).await;
        assert_eq!(body_bytes(resp).await, b"PNGDATA");
    }

    #[tokio::test]
    async fn multipart_without_file_field_is_bad_request() {
        let (app, _dir) = app();
        let boundary = "xyz";
        let body = "--xyz\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nv\r\n--xyz--\r\n";
        let req = request(Method::POST, "/f.txt")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap();
        assert_eq!(send(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn invalid_pathnames_are_bad_requests() {
        let (app, dir) = app();
        for uri in ["/../../etc/passwd", "/.hidden.conf", "/no_extension", "/a%20b.txt"] {
            let resp = upload(&app, uri, b"x", "text/plain").await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "uri {uri}");
            let json: serde_json::Value =
                serde_json::from_slice(&body_bytes(resp).await).unwrap();
            assert_eq!(json["status"], 400);
        }
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let (app, _dir) = app();
        static BIG: [u8; LIMIT as usize + 1] = [b'x'; LIMIT as usize + 1];
        let resp = upload(&app, "/big.bin", &BIG, "application/octet-stream").await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let resp = send(&app, request(Method::GET, "/big.bin").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_with_missing_content_is_not_found() {
        let (app, dir) = app();
        upload(&app, "/gone.txt", b"x", "text/plain").await;
        tokio::fs::remove_file(dir.path().join("gone.txt")).await.unwrap();

        let resp = send(&app, request(Method::DELETE, "/gone.txt").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = send(&app, request(Method::GET, "/api/blobs").body(Body::empty()).unwrap()).await;
        let listed: Vec<BlobMetadata> = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert!(listed.is_empty());
    }
}
