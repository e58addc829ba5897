//! HTTP client for the Drime cloud file API.
//!
//! Every call carries the configured bearer token. All tolerance for the
//! vendor's inconsistent response shapes lives in the `decode_*` functions
//! at the bottom of this module.

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use familycloud_common::backend::{DecodeError, StorageError};
use familycloud_common::documents::{PhotoContent, PhotoFile, PhotoRecord, StorageUsage};
use familycloud_common::progress::ProgressReporter;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Method, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Vendor endpoint paths, relative to the API base URL.
///
/// `{workspace}`, `{folder}` and `{id}` are substituted per call.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct VendorPaths {
    pub identity: String,
    pub folders: String,
    pub folder_files: String,
    pub upload: String,
    pub file: String,
    pub usage: String,
}

impl Default for VendorPaths {
    fn default() -> Self {
        Self {
            identity: "/workspace".to_string(),
            folders: "/workspace/{workspace}/folders".to_string(),
            folder_files: "/folders/{folder}/files".to_string(),
            upload: "/upload".to_string(),
            file: "/files/{id}".to_string(),
            usage: "/workspace/usage".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Folder {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub id: String,
    pub url: String,
    pub name: String,
}

#[derive(Clone)]
pub struct DrimeClient {
    client: Client,
    base_url: String,
    access_token: String,
    paths: VendorPaths,
}

impl DrimeClient {
    pub fn new(base_url: &str, access_token: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            paths: VendorPaths::default(),
        }
    }

    pub fn with_paths(mut self, paths: VendorPaths) -> Self {
        self.paths = paths;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Authenticated JSON request. An empty response body decodes as `null`.
    pub async fn request(&self, path: &str, method: Method, body: Option<&Value>) -> Result<Value, StorageError> {
        let mut req = self
            .client
            .request(method.clone(), self.url(path))
            .bearer_auth(&self.access_token);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        debug!(%method, path, status = status.as_u16(), "Drime request");

        match status {
            s if s.is_success() => {
                if text.trim().is_empty() {
                    Ok(Value::Null)
                } else {
                    serde_json::from_str(&text)
                        .map_err(|e| StorageError::Decode(DecodeError::InvalidJson(e.to_string())))
                }
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(StorageError::Auth { status: status.as_u16() })
            }
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(path.to_string())),
            _ => Err(StorageError::Api {
                status: status.as_u16(),
                body: text,
            }),
        }
    }

    /// Capability probe. Any failure, including network errors, is `false`.
    pub async fn validate_credentials(&self) -> bool {
        match self.request(&self.paths.identity, Method::GET, None).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Drime credential probe failed");
                false
            }
        }
    }

    /// Resolve the workspace id the token belongs to.
    pub async fn workspace_id(&self) -> Result<String, StorageError> {
        let value = self.request(&self.paths.identity, Method::GET, None).await?;
        Ok(decode_workspace_id(&value)?)
    }

    pub async fn list_folders(&self, workspace_id: &str) -> Result<Vec<Folder>, StorageError> {
        let path = self.folders_path(workspace_id);
        let value = self.request(&path, Method::GET, None).await?;
        Ok(decode_folders(&value)?)
    }

    pub async fn create_folder(&self, workspace_id: &str, name: &str) -> Result<Folder, StorageError> {
        let path = self.folders_path(workspace_id);
        let body = serde_json::json!({ "name": name });
        let value = self.request(&path, Method::POST, Some(&body)).await?;
        Ok(decode_folder(&value)?)
    }

    /// Raw entries of a folder; callers filter and decode them.
    pub async fn list_files(&self, folder_id: &str) -> Result<Vec<Value>, StorageError> {
        let path = self
            .paths
            .folder_files
            .replace("{folder}", &urlencoding::encode(folder_id));
        let value = self.request(&path, Method::GET, None).await?;
        Ok(decode_file_list(value)?)
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<(), StorageError> {
        let path = self.paths.file.replace("{id}", &urlencoding::encode(file_id));
        self.request(&path, Method::DELETE, None).await?;
        Ok(())
    }

    pub async fn usage(&self) -> Result<StorageUsage, StorageError> {
        let value = self.request(&self.paths.usage, Method::GET, None).await?;
        Ok(decode_usage(&value)?)
    }

    /// Multipart upload of `file` into `folder_id`, reporting byte progress
    /// as the body is streamed out.
    pub async fn upload_file(
        &self,
        file: PhotoFile,
        folder_id: &str,
        progress: ProgressReporter,
    ) -> Result<UploadedFile, StorageError> {
        let total = file.len();
        let chunks = split_chunks(&file.bytes, UPLOAD_CHUNK_SIZE);
        let mut sent = 0u64;
        let stream = futures::stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len() as u64;
            progress.bytes(sent, total);
            Ok::<Bytes, std::io::Error>(chunk)
        }));

        let part = Part::stream_with_length(Body::wrap_stream(stream), total)
            .file_name(file.name.clone())
            .mime_str(&file.content_type)
            .map_err(|e| StorageError::Upload(format!("invalid content type: {}", e)))?;
        let form = Form::new()
            .part("file", part)
            .text("folderId", folder_id.to_string());

        let resp = self
            .client
            .post(self.url(&self.paths.upload))
            .bearer_auth(&self.access_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;
        if !status.is_success() {
            return Err(StorageError::Upload(format!("HTTP {} - {}", status, text)));
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| StorageError::Decode(DecodeError::InvalidJson(e.to_string())))?;
        let uploaded = decode_uploaded(&value)?;
        debug!(id = %uploaded.id, name = %uploaded.name, "Drime upload complete");
        Ok(uploaded)
    }

    fn folders_path(&self, workspace_id: &str) -> String {
        self.paths
            .folders
            .replace("{workspace}", &urlencoding::encode(workspace_id))
    }
}

fn split_chunks(bytes: &Bytes, size: usize) -> Vec<Bytes> {
    if bytes.is_empty() {
        return vec![Bytes::new()];
    }
    (0..bytes.len())
        .step_by(size)
        .map(|start| bytes.slice(start..(start + size).min(bytes.len())))
        .collect()
}

// ── Response decoding ──

/// Ids arrive as strings or numbers depending on the endpoint.
fn decode_id(value: &Value, field: &'static str) -> Result<String, DecodeError> {
    match value.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(DecodeError::BadType { field }),
        None => Err(DecodeError::MissingField(field)),
    }
}

fn decode_str<'a>(value: &'a Value, field: &'static str) -> Result<&'a str, DecodeError> {
    match value.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(DecodeError::BadType { field }),
        None => Err(DecodeError::MissingField(field)),
    }
}

fn opt_str<'a>(value: &'a Value, fields: &[&str]) -> Option<&'a str> {
    fields
        .iter()
        .find_map(|f| value.get(*f).and_then(|v| v.as_str()))
        .filter(|s| !s.is_empty())
}

/// Unwrap `{"<key>": {...}}` envelopes some endpoints use.
fn unwrap_envelope<'a>(value: &'a Value, keys: &[&str]) -> &'a Value {
    keys.iter()
        .find_map(|k| value.get(*k).filter(|v| v.is_object()))
        .unwrap_or(value)
}

fn decode_array<'a>(value: &'a Value, keys: &[&'static str]) -> Result<&'a Vec<Value>, DecodeError> {
    if let Some(arr) = value.as_array() {
        return Ok(arr);
    }
    for key in keys {
        if let Some(v) = value.get(*key) {
            return v.as_array().ok_or(DecodeError::BadType { field: *key });
        }
    }
    Err(DecodeError::MissingField(keys.first().copied().unwrap_or("items")))
}

pub fn decode_workspace_id(value: &Value) -> Result<String, DecodeError> {
    decode_id(unwrap_envelope(value, &["workspace"]), "id")
}

pub fn decode_folder(value: &Value) -> Result<Folder, DecodeError> {
    let folder = unwrap_envelope(value, &["folder", "fileEntry"]);
    Ok(Folder {
        id: decode_id(folder, "id")?,
        name: decode_str(folder, "name")?.to_string(),
    })
}

/// Folder listing in vendor order.
pub fn decode_folders(value: &Value) -> Result<Vec<Folder>, DecodeError> {
    decode_array(value, &["folders", "data"])?
        .iter()
        .map(decode_folder)
        .collect()
}

pub fn decode_file_list(value: Value) -> Result<Vec<Value>, DecodeError> {
    Ok(decode_array(&value, &["files", "data"])?.clone())
}

/// Whether a listing entry declares an image content type.
pub fn is_image_entry(entry: &Value) -> bool {
    opt_str(entry, &["mimeType", "mime_type", "mime"])
        .is_some_and(|mime| mime.to_ascii_lowercase().starts_with("image/"))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DecodeError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(DecodeError::BadTimestamp(raw.to_string()))
}

/// Normalize one listing entry into a [`PhotoRecord`].
///
/// The vendor does not record who uploaded a file, so every record gets
/// `default_uploader`. Entries whose timestamp is missing or unreadable get
/// the Unix epoch.
pub fn decode_file_entry(entry: &Value, default_uploader: &str) -> Result<PhotoRecord, DecodeError> {
    let id = decode_id(entry, "id")?;
    let name = decode_str(entry, "name")?.to_string();
    let url = opt_str(entry, &["url", "downloadUrl"])
        .ok_or(DecodeError::MissingField("url"))?
        .to_string();
    let thumbnail = opt_str(entry, &["thumbnail", "thumbnailUrl"]).map(str::to_string);
    let size = entry.get("size").and_then(|v| v.as_u64());
    let uploaded_at = match opt_str(entry, &["createdAt", "created_at", "updatedAt"]) {
        Some(raw) => parse_timestamp(raw).unwrap_or_else(|e| {
            warn!(id = %id, error = %e, "Unreadable Drime timestamp, using epoch");
            DateTime::<Utc>::default()
        }),
        None => DateTime::<Utc>::default(),
    };

    Ok(PhotoRecord {
        id,
        name,
        content: PhotoContent::Remote { url },
        thumbnail,
        size,
        uploaded_at,
        uploaded_by: default_uploader.to_string(),
    })
}

pub fn decode_uploaded(value: &Value) -> Result<UploadedFile, DecodeError> {
    let file = unwrap_envelope(value, &["fileEntry", "file"]);
    Ok(UploadedFile {
        id: decode_id(file, "id")?,
        url: opt_str(file, &["url", "downloadUrl"])
            .ok_or(DecodeError::MissingField("url"))?
            .to_string(),
        name: decode_str(file, "name")?.to_string(),
    })
}

pub fn decode_usage(value: &Value) -> Result<StorageUsage, DecodeError> {
    let number = |field: &'static str| -> Result<u64, DecodeError> {
        let v = value.get(field).ok_or(DecodeError::MissingField(field))?;
        v.as_u64()
            .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .ok_or(DecodeError::BadType { field })
    };
    Ok(StorageUsage {
        used: number("used")?,
        total: number("total")?,
    })
}
