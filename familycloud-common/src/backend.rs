use crate::documents::{BackendKind, PhotoFile, PhotoRecord, StorageUsage};
use crate::progress::UploadHandle;

/// Errors raised by storage backends.
///
/// These never reach the user directly: the coordinator turns them into a
/// backend switch, the catalog into a counted failure.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("credentials rejected (HTTP {status})")]
    Auth { status: u16 },
    #[error("API error: HTTP {status} - {body}")]
    Api { status: u16, body: String },
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Decode(#[from] DecodeError),
    #[error("{name} is too large ({size} bytes, limit {limit})")]
    TooLarge { name: String, size: u64, limit: u64 },
    #[error("local storage full ({needed} bytes needed, capacity {capacity})")]
    QuotaExceeded { needed: u64, capacity: u64 },
    #[error("local persistence failed: {0}")]
    Persistence(String),
    #[error("backend not initialized")]
    NotReady,
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// A vendor response that could not be mapped onto our types.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` has unexpected type")]
    BadType { field: &'static str },
    #[error("unparseable timestamp `{0}`")]
    BadTimestamp(String),
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
}

/// Trait implemented by every photo storage backend.
///
/// Remote vendors and local persistence both present this surface so the
/// coordinator and catalog never see vendor specifics. `init` reports
/// readiness instead of failing; everything else returns [`StorageError`].
#[async_trait::async_trait]
pub trait PhotoBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Largest single file this backend accepts, in bytes.
    fn max_file_size(&self) -> u64;

    /// Validate credentials and resolve the album root container.
    async fn init(&self) -> bool;

    /// All image entries of the album, in backend listing order.
    async fn list_photos(&self) -> Result<Vec<PhotoRecord>, StorageError>;

    /// Start uploading one file. Nothing happens until the handle is polled.
    fn upload(&self, file: PhotoFile, uploader: &str) -> UploadHandle;

    /// Delete a photo by id. Deleting an unknown id succeeds.
    async fn delete(&self, id: &str) -> Result<(), StorageError>;

    async fn storage_usage(&self) -> Result<StorageUsage, StorageError>;
}

/// Reject files over `limit` before any transfer starts.
pub fn check_file_size(file: &PhotoFile, limit: u64) -> Result<(), StorageError> {
    if file.len() > limit {
        return Err(StorageError::TooLarge {
            name: file.name.clone(),
            size: file.len(),
            limit,
        });
    }
    Ok(())
}
