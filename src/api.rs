//! HTTP API over the temporary store.
//!
//! Endpoints:
//!   GET    /api/status                    → entry count + TTL (JSON)
//!   POST   /api/files                     → create, body {display_name?, mime_type?}
//!   GET    /api/files/{handle}            → stat (JSON)
//!   PATCH  /api/files/{handle}            → 405, entries are immutable
//!   DELETE /api/files/{handle}            → remove
//!   PUT    /api/files/{handle}/data       → stream raw body into the blob
//!   GET    /api/files/{handle}/data       → stream the blob back
//!   POST   /api/gc?ttl_secs=N             → collect garbage + reconcile

use std::sync::Arc;

use async_stream::try_stream;
use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::BytesMut;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::error::StoreError;
use crate::storage::{FileHandle, FileStat, TempStore, WILDCARD_MIME};

/// Read size for streamed downloads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Shared state passed to all handlers.
pub struct AppState {
    pub store: Arc<TempStore>,
    pub config: Config,
}

// ──────────────── request / response types ────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct CreateRequest {
    pub display_name: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Deserialize)]
pub struct GcParams {
    ttl_secs: Option<u64>,
}

#[derive(Serialize)]
struct FileInfo {
    handle: FileHandle,
    display_name: Option<String>,
    mime_type: String,
    size: u64,
}

impl FileInfo {
    fn new(handle: FileHandle, stat: FileStat) -> Self {
        Self {
            handle,
            display_name: stat.display_name,
            mime_type: stat.mime_type,
            size: stat.size,
        }
    }
}

#[derive(Serialize)]
struct StatusResponse {
    entries: usize,
    ttl_secs: u64,
}

#[derive(Serialize)]
struct GcResponse {
    removed: usize,
    orphan_blobs_removed: usize,
    dangling_rows: usize,
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::InvalidHandle(_) | StoreError::InvalidArgument(_) => {
                StatusCode::BAD_REQUEST
            }
            StoreError::UnsupportedOperation(_) => StatusCode::METHOD_NOT_ALLOWED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "Request failed");
        }
        (status, Json(serde_json::json!({"error": self.to_string()}))).into_response()
    }
}

// ──────────────── router ──────────────────────────────────────────────────

/// Build the axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/status", get(handle_status))
        .route("/api/files", post(handle_create))
        .route(
            "/api/files/{handle}",
            get(handle_stat).patch(handle_update).delete(handle_remove),
        )
        .route("/api/files/{handle}/data", get(handle_read).put(handle_write))
        .route("/api/gc", post(handle_gc))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn start_server(state: Arc<AppState>, port: u16) {
    let app = build_router(state);
    let addr = format!("0.0.0.0:{}", port);
    info!(port, "HTTP API listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, "Failed to bind HTTP server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "HTTP server error");
    }
}

/// Run a blocking store call off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        StoreError::Io(std::io::Error::other(format!("blocking task failed: {e}")))
    })?
}

// ──────────────── handlers ────────────────────────────────────────────────

async fn handle_status(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, StoreError> {
    let store = state.store.clone();
    let entries = blocking(move || store.len()).await?;
    Ok(Json(StatusResponse {
        entries,
        ttl_secs: state.config.storage.ttl_secs,
    }))
}

async fn handle_create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRequest>,
) -> Result<impl IntoResponse, StoreError> {
    let store = state.store.clone();
    let info = blocking(move || {
        let handle = store.create(req.display_name.as_deref(), req.mime_type.as_deref())?;
        let stat = store
            .stat(handle)?
            .ok_or_else(|| StoreError::NotFound(handle.to_string()))?;
        Ok(FileInfo::new(handle, stat))
    })
    .await?;

    info!(handle = %info.handle, mime = %info.mime_type, "File created via API");
    Ok((StatusCode::CREATED, Json(info)))
}

async fn handle_stat(
    State(state): State<Arc<AppState>>,
    Path(handle): Path<String>,
) -> Result<impl IntoResponse, StoreError> {
    let handle: FileHandle = handle.parse()?;
    let store = state.store.clone();
    let stat = blocking(move || store.stat(handle))
        .await?
        .ok_or_else(|| StoreError::NotFound(handle.to_string()))?;
    Ok(Json(FileInfo::new(handle, stat)))
}

async fn handle_update(
    State(state): State<Arc<AppState>>,
    Path(handle): Path<String>,
) -> Result<StatusCode, StoreError> {
    let handle: FileHandle = handle.parse()?;
    state.store.update(handle)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_remove(
    State(state): State<Arc<AppState>>,
    Path(handle): Path<String>,
) -> Result<StatusCode, StoreError> {
    let handle: FileHandle = handle.parse()?;
    let store = state.store.clone();
    if blocking(move || store.remove(handle)).await? {
        info!(handle = %handle, "File removed via API");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StoreError::NotFound(handle.to_string()))
    }
}

/// The body is copied to the blob chunk by chunk, so upload size is bounded by
/// the disk and not by memory.
async fn handle_write(
    State(state): State<Arc<AppState>>,
    Path(handle): Path<String>,
    body: Body,
) -> Result<StatusCode, StoreError> {
    let handle: FileHandle = handle.parse()?;
    let store = state.store.clone();
    let file = blocking(move || store.open_for_write(handle)).await?;
    let mut file = tokio::fs::File::from_std(file);

    let mut stream = body.into_data_stream();
    let mut len = 0usize;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(std::io::Error::other)?;
        file.write_all(&chunk).await?;
        len += chunk.len();
    }
    file.sync_all().await?;

    info!(handle = %handle, bytes = len, "File written via API");
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_read(
    State(state): State<Arc<AppState>>,
    Path(handle): Path<String>,
) -> Result<Response, StoreError> {
    let handle: FileHandle = handle.parse()?;
    let store = state.store.clone();
    let (file, stat) = blocking(move || {
        let not_found = || StoreError::NotFound(handle.to_string());
        let stat = store.stat(handle)?.ok_or_else(not_found)?;
        let file = store.open_for_read(handle)?.ok_or_else(not_found)?;
        Ok((file, stat))
    })
    .await?;

    let mut response = Body::from_stream(file_stream(tokio::fs::File::from_std(file)))
        .into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type(&stat.mime_type));
    if let Some(value) = stat.display_name.as_deref().and_then(content_disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

async fn handle_gc(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GcParams>,
) -> Result<impl IntoResponse, StoreError> {
    let ttl = match params.ttl_secs {
        Some(0) => return Err(StoreError::InvalidArgument("ttl_secs must be > 0".into())),
        Some(secs) => std::time::Duration::from_secs(secs),
        None => state.config.storage.ttl(),
    };
    let store = state.store.clone();
    let (removed, report) = blocking(move || {
        let removed = store.collect_garbage(Utc::now(), ttl)?;
        let report = store.reconcile()?;
        Ok((removed, report))
    })
    .await?;

    Ok(Json(GcResponse {
        removed,
        orphan_blobs_removed: report.orphan_blobs_removed,
        dangling_rows: report.dangling_rows,
    }))
}

// ──────────────── helpers ─────────────────────────────────────────────────

fn file_stream(mut file: tokio::fs::File) -> impl Stream<Item = std::io::Result<Bytes>> {
    try_stream! {
        loop {
            let mut buf = BytesMut::with_capacity(STREAM_CHUNK_SIZE);
            if file.read_buf(&mut buf).await? == 0 {
                break;
            }
            yield buf.freeze();
        }
    }
}

fn content_type(mime: &str) -> HeaderValue {
    if mime == WILDCARD_MIME {
        return HeaderValue::from_static("application/octet-stream");
    }
    HeaderValue::from_str(mime).unwrap_or(HeaderValue::from_static("application/octet-stream"))
}

fn content_disposition(name: &str) -> Option<HeaderValue> {
    let name = name.replace(['"', '\\'], "_");
    HeaderValue::from_str(&format!("attachment; filename=\"{name}\"")).ok()
}
