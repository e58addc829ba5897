//! Local persistence backend.
//!
//! All photos live in one slot as a JSON array, each image embedded as a
//! base64 `data:` URL. Capacity is measured on the serialized slot, the way
//! a browser quota would see it.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use tracing::debug;

use familycloud_common::backend::{check_file_size, PhotoBackend, StorageError};
use familycloud_common::documents::{BackendKind, PhotoContent, PhotoFile, PhotoRecord, StorageUsage};
use familycloud_common::progress::UploadHandle;

use crate::slots::{read_json, write_json, SlotStore, LOCAL_PHOTOS_SLOT};

#[derive(Clone)]
pub struct LocalAdapter {
    store: Arc<dyn SlotStore>,
    max_file_size: u64,
    capacity: u64,
}

impl LocalAdapter {
    pub fn new(store: Arc<dyn SlotStore>, max_file_size: u64, capacity: u64) -> Self {
        Self { store, max_file_size, capacity }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    fn load(&self) -> Result<Vec<PhotoRecord>, StorageError> {
        Ok(read_json(self.store.as_ref(), LOCAL_PHOTOS_SLOT)?.unwrap_or_default())
    }

    /// Encode, append and persist one photo.
    pub fn store_photo(&self, file: PhotoFile, uploader: &str) -> Result<PhotoRecord, StorageError> {
        check_file_size(&file, self.max_file_size)?;

        let record = PhotoRecord {
            id: PhotoRecord::new_local_id(),
            name: file.name.clone(),
            content: PhotoContent::Embedded {
                data_url: encode_data_url(&file.content_type, &file.bytes),
            },
            thumbnail: None,
            size: Some(file.len()),
            uploaded_at: Utc::now(),
            uploaded_by: uploader.to_string(),
        };

        let mut photos = self.load()?;
        photos.push(record.clone());
        let serialized = serde_json::to_string(&photos)
            .map_err(|e| StorageError::Persistence(e.to_string()))?;
        let needed = serialized.len() as u64;
        if needed > self.capacity {
            return Err(StorageError::QuotaExceeded {
                needed,
                capacity: self.capacity,
            });
        }
        self.store.write(LOCAL_PHOTOS_SLOT, &serialized)?;

        debug!(id = %record.id, name = %record.name, bytes = needed, "Stored photo locally");
        Ok(record)
    }
}

#[async_trait]
impl PhotoBackend for LocalAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    async fn init(&self) -> bool {
        true
    }

    async fn list_photos(&self) -> Result<Vec<PhotoRecord>, StorageError> {
        self.load()
    }

    fn upload(&self, file: PhotoFile, uploader: &str) -> UploadHandle {
        let local = self.clone();
        let uploader = uploader.to_string();
        UploadHandle::new(move |_| async move { local.store_photo(file, &uploader) })
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let mut photos = self.load()?;
        let before = photos.len();
        photos.retain(|p| p.id != id);
        if photos.len() == before {
            debug!(id, "Local delete of unknown id ignored");
            return Ok(());
        }
        write_json(self.store.as_ref(), LOCAL_PHOTOS_SLOT, &photos)?;
        Ok(())
    }

    async fn storage_usage(&self) -> Result<StorageUsage, StorageError> {
        let used = self
            .store
            .read(LOCAL_PHOTOS_SLOT)?
            .map(|raw| raw.len() as u64)
            .unwrap_or(0);
        Ok(StorageUsage { used, total: self.capacity })
    }
}

pub fn encode_data_url(content_type: &str, bytes: &[u8]) -> String {
    let mime = if content_type.is_empty() {
        "application/octet-stream"
    } else {
        content_type
    };
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Split a base64 `data:` URL into its MIME type and decoded bytes.
pub fn decode_data_url(data_url: &str) -> Option<(String, Vec<u8>)> {
    let rest = data_url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let bytes = STANDARD.decode(payload).ok()?;
    Some((mime.to_string(), bytes))
}
