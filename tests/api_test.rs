//! HTTP API tests, driven through the router without a socket.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{TimeDelta, Utc};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use tempstore::api::{build_router, AppState};
use tempstore::config::Config;
use tempstore::TempStore;

struct TestApp {
    router: Router,
    store: Arc<TempStore>,
    _dir: TempDir,
}

impl TestApp {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        let config = Config::from_toml(&format!(
            "[storage]\nbase_path = {:?}\nttl_secs = 3600\n",
            dir.path().display().to_string()
        ))
        .expect("config");
        let store = Arc::new(TempStore::open(&config.storage.base_path).expect("open store"));
        let router = build_router(Arc::new(AppState {
            store: store.clone(),
            config,
        }));
        Self {
            router,
            store,
            _dir: dir,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, body.to_vec())
    }

    async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.send(request).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }
}

fn empty(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn json(method: &str, uri: &str, value: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(value.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_create_write_read_remove() {
    let app = TestApp::new();

    let (status, created) = app
        .send_json(json(
            "POST",
            "/api/files",
            serde_json::json!({"display_name": "report.pdf", "mime_type": "application/pdf"}),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["size"], 0);
    let handle = created["handle"].as_i64().expect("handle");

    let payload = vec![0x42u8; 1024];
    let put = Request::builder()
        .method("PUT")
        .uri(format!("/api/files/{handle}/data"))
        .body(Body::from(payload.clone()))
        .unwrap();
    let (status, _, _) = app.send(put).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, stat) = app
        .send_json(empty("GET", &format!("/api/files/{handle}")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stat["display_name"], "report.pdf");
    assert_eq!(stat["mime_type"], "application/pdf");
    assert_eq!(stat["size"], 1024);

    let (status, headers, body) = app
        .send(empty("GET", &format!("/api/files/{handle}/data")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"report.pdf\""
    );
    assert_eq!(body, payload);

    let (status, _, _) = app
        .send(empty("DELETE", &format!("/api/files/{handle}")))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, _) = app
        .send(empty("DELETE", &format!("/api/files/{handle}")))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = app
        .send(empty("GET", &format!("/api/files/{handle}/data")))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_defaults_to_wildcard_mime() {
    let app = TestApp::new();

    let (status, created) = app
        .send_json(json("POST", "/api/files", serde_json::json!({})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["mime_type"], "*/*");
    assert_eq!(created["display_name"], Value::Null);

    let handle = created["handle"].as_i64().expect("handle");
    let (_, headers, _) = app
        .send(empty("GET", &format!("/api/files/{handle}/data")))
        .await;
    assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
}

#[tokio::test]
async fn test_update_is_rejected() {
    let app = TestApp::new();
    let h = app.store.create(Some("a.txt"), Some("text/plain")).unwrap();

    let (status, body) = app
        .send_json(json(
            "PATCH",
            &format!("/api/files/{h}"),
            serde_json::json!({"display_name": "b.txt"}),
        ))
        .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert!(body["error"].as_str().unwrap().contains("Unsupported"));

    // Nothing changed.
    assert_eq!(
        app.store.stat(h).unwrap().unwrap().display_name.as_deref(),
        Some("a.txt")
    );
}

#[tokio::test]
async fn test_unknown_and_invalid_handles() {
    let app = TestApp::new();

    let (status, _, _) = app.send(empty("GET", "/api/files/77")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = app.send(empty("GET", "/api/files/not-a-handle")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let put = Request::builder()
        .method("PUT")
        .uri("/api/files/77/data")
        .body(Body::from("orphan"))
        .unwrap();
    let (status, _, _) = app.send(put).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.store.is_empty().unwrap());
}

#[tokio::test]
async fn test_gc_endpoint() {
    let app = TestApp::new();
    let now = Utc::now();
    let old = app
        .store
        .create_at(Some("old"), None, now - TimeDelta::hours(2))
        .unwrap();
    let young = app.store.create(Some("young"), None).unwrap();

    let (status, body) = app.send_json(empty("POST", "/api/gc")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 1);
    assert_eq!(body["orphan_blobs_removed"], 0);

    assert_eq!(app.store.stat(old).unwrap(), None);
    assert!(app.store.stat(young).unwrap().is_some());

    let (status, status_body) = app.send_json(empty("GET", "/api/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(status_body["entries"], 1);
    assert_eq!(status_body["ttl_secs"], 3600);
}

#[tokio::test]
async fn test_gc_endpoint_ttl_override() {
    let app = TestApp::new();
    app.store
        .create_at(None, None, Utc::now() - TimeDelta::minutes(10))
        .unwrap();

    let (_, body) = app.send_json(empty("POST", "/api/gc")).await;
    assert_eq!(body["removed"], 0);

    let (_, body) = app.send_json(empty("POST", "/api/gc?ttl_secs=60")).await;
    assert_eq!(body["removed"], 1);
}

#[tokio::test]
async fn test_gc_endpoint_rejects_zero_ttl() {
    let app = TestApp::new();
    let h = app.store.create(Some("kept"), None).unwrap();

    let (status, body) = app.send_json(empty("POST", "/api/gc?ttl_secs=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("ttl_secs"));
    assert!(app.store.stat(h).unwrap().is_some());
}

#[tokio::test]
async fn test_upload_larger_than_default_body_limit() {
    let app = TestApp::new();
    let h = app.store.create(Some("big.bin"), None).unwrap();

    // Above axum's 2 MiB default for buffered extractors.
    let payload: Vec<u8> = (0..3 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
    let put = Request::builder()
        .method("PUT")
        .uri(format!("/api/files/{h}/data"))
        .body(Body::from(payload.clone()))
        .unwrap();
    let (status, _, _) = app.send(put).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert_eq!(app.store.stat(h).unwrap().unwrap().size, payload.len() as u64);
    let (status, _, body) = app.send(empty("GET", &format!("/api/files/{h}/data"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, payload);
}
