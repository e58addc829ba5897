//! In-process fake of the Drime file API, served with axum on 127.0.0.1:0.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};

pub const TOKEN: &str = "26386|test-token";
pub const WORKSPACE_ID: u64 = 42;

#[derive(Default)]
pub struct VendorState {
    pub folders: Mutex<Vec<Value>>,
    pub files: Mutex<Vec<Value>>,
    pub folder_creates: AtomicUsize,
    pub requests: AtomicUsize,
    pub fail_listing: AtomicBool,
    pub fail_upload_names: Mutex<HashSet<String>>,
    next_id: AtomicUsize,
}

impl VendorState {
    pub fn new() -> Arc<Self> {
        let state = Arc::new(Self::default());
        state.next_id.store(100, Ordering::SeqCst);
        state
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn fail_upload_of(&self, name: &str) {
        self.fail_upload_names.lock().unwrap().insert(name.to_string());
    }

    /// Put a file straight into storage, bypassing the upload endpoint.
    pub fn seed_file(&self, name: &str, mime: &str) -> String {
        let id = self.next_id();
        self.files.lock().unwrap().push(json!({
            "id": id,
            "name": name,
            "url": format!("https://cdn.drime.test/{}", id),
            "mimeType": mime,
            "size": 1234,
            "createdAt": "2024-05-01T10:00:00.000000Z",
        }));
        id.to_string()
    }

    fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            == Some(TOKEN)
    }
}

type Shared = State<Arc<VendorState>>;

/// Serve the fake vendor and return its base URL.
pub async fn spawn_vendor(state: Arc<VendorState>) -> String {
    let app = Router::new()
        .route("/workspace", get(workspace))
        .route("/workspace/usage", get(usage))
        .route("/workspace/{workspace}/folders", get(list_folders).post(create_folder))
        .route("/folders/{folder}/files", get(list_files))
        .route("/upload", post(upload))
        .route("/files/{id}", delete(delete_file))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn workspace(State(state): Shared, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({ "id": WORKSPACE_ID, "name": "Family" })).into_response()
}

async fn usage(State(state): Shared, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let used: u64 = state
        .files
        .lock()
        .unwrap()
        .iter()
        .filter_map(|f| f["size"].as_u64())
        .sum();
    Json(json!({ "used": used, "total": 20u64 * 1024 * 1024 * 1024 })).into_response()
}

async fn list_folders(State(state): Shared, headers: HeaderMap, Path(_ws): Path<String>) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(Value::Array(state.folders.lock().unwrap().clone())).into_response()
}

async fn create_folder(
    State(state): Shared,
    headers: HeaderMap,
    Path(_ws): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state.folder_creates.fetch_add(1, Ordering::SeqCst);
    let folder = json!({ "id": state.next_id(), "name": body["name"] });
    state.folders.lock().unwrap().push(folder.clone());
    (StatusCode::CREATED, Json(json!({ "folder": folder }))).into_response()
}

async fn list_files(State(state): Shared, headers: HeaderMap, Path(_folder): Path<String>) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if state.fail_listing.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "backend exploded").into_response();
    }
    Json(json!({ "files": state.files.lock().unwrap().clone() })).into_response()
}

async fn upload(State(state): Shared, headers: HeaderMap, mut multipart: Multipart) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let mut name = None;
    let mut mime = None;
    let mut size = 0usize;
    let mut folder_id = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                name = field.file_name().map(str::to_string);
                mime = field.content_type().map(str::to_string);
                size = field.bytes().await.map(|b| b.len()).unwrap_or(0);
            }
            "folderId" => folder_id = field.text().await.ok(),
            _ => {}
        }
    }

    let (Some(name), Some(_folder_id)) = (name, folder_id) else {
        return (StatusCode::UNPROCESSABLE_ENTITY, "missing file or folderId").into_response();
    };
    if state.fail_upload_names.lock().unwrap().contains(&name) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "storage node unavailable").into_response();
    }

    let id = state.next_id();
    let url = format!("https://cdn.drime.test/{}", id);
    state.files.lock().unwrap().push(json!({
        "id": id,
        "name": name,
        "url": url,
        "mimeType": mime.unwrap_or_else(|| "application/octet-stream".to_string()),
        "size": size,
        "createdAt": "2024-06-01 08:30:00",
    }));
    Json(json!({ "fileEntry": { "id": id, "name": name, "url": url } })).into_response()
}

async fn delete_file(State(state): Shared, headers: HeaderMap, Path(id): Path<String>) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut files = state.files.lock().unwrap();
    let before = files.len();
    files.retain(|f| f["id"].to_string() != id);
    if files.len() == before {
        return StatusCode::NOT_FOUND.into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}
