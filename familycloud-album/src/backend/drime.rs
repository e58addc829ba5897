//! Drime cloud backend adapter.
//!
//! Wraps [`DrimeClient`] behind the uniform [`PhotoBackend`] surface. The
//! album lives in one dedicated root folder that `init` finds or creates.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use familycloud_common::backend::{check_file_size, PhotoBackend, StorageError};
use familycloud_common::documents::{BackendKind, PhotoContent, PhotoFile, PhotoRecord, StorageUsage};
use familycloud_common::progress::UploadHandle;

use crate::drime::{decode_file_entry, is_image_entry, DrimeClient};

/// Per-process remote session state. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendSession {
    pub workspace_id: Option<String>,
    pub root_container_id: Option<String>,
    pub ready: bool,
}

pub struct DrimeAdapter {
    client: DrimeClient,
    root_folder: String,
    max_file_size: u64,
    default_uploader: String,
    session: RwLock<BackendSession>,
}

impl DrimeAdapter {
    pub fn new(client: DrimeClient, root_folder: &str, max_file_size: u64, default_uploader: &str) -> Self {
        Self {
            client,
            root_folder: root_folder.to_string(),
            max_file_size,
            default_uploader: default_uploader.to_string(),
            session: RwLock::new(BackendSession::default()),
        }
    }

    pub fn session(&self) -> BackendSession {
        self.session.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn root_id(&self) -> Option<String> {
        let session = self.session.read().unwrap_or_else(|e| e.into_inner());
        session.root_container_id.clone().filter(|_| session.ready)
    }

    /// Find the album folder by exact name, creating it on a miss.
    ///
    /// An id resolved earlier in this session for the same workspace is
    /// reused without touching the vendor.
    async fn ensure_root_folder(&self, workspace_id: &str) -> Result<String, StorageError> {
        {
            let session = self.session.read().unwrap_or_else(|e| e.into_inner());
            if session.workspace_id.as_deref() == Some(workspace_id) {
                if let Some(id) = &session.root_container_id {
                    return Ok(id.clone());
                }
            }
        }

        let folders = self.client.list_folders(workspace_id).await?;
        if let Some(folder) = folders.into_iter().find(|f| f.name == self.root_folder) {
            debug!(folder_id = %folder.id, "Found album root folder");
            return Ok(folder.id);
        }

        let folder = self.client.create_folder(workspace_id, &self.root_folder).await?;
        info!(folder_id = %folder.id, name = %self.root_folder, "Created album root folder");
        Ok(folder.id)
    }

    async fn try_init(&self) -> Result<bool, StorageError> {
        if !self.client.validate_credentials().await {
            warn!(base_url = %self.client.base_url(), "Drime credentials rejected");
            return Ok(false);
        }
        let workspace_id = self.client.workspace_id().await?;
        let root_id = self.ensure_root_folder(&workspace_id).await?;

        let mut session = self.session.write().unwrap_or_else(|e| e.into_inner());
        *session = BackendSession {
            workspace_id: Some(workspace_id),
            root_container_id: Some(root_id),
            ready: true,
        };
        Ok(true)
    }
}

#[async_trait]
impl PhotoBackend for DrimeAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    async fn init(&self) -> bool {
        let ready = match self.try_init().await {
            Ok(ready) => ready,
            Err(e) => {
                warn!(error = %e, "Drime initialization failed");
                false
            }
        };
        if ready {
            info!(folder_id = ?self.session().root_container_id, "Drime backend ready");
        } else {
            self.session.write().unwrap_or_else(|e| e.into_inner()).ready = false;
        }
        ready
    }

    async fn list_photos(&self) -> Result<Vec<PhotoRecord>, StorageError> {
        let root_id = self.root_id().ok_or(StorageError::NotReady)?;
        let entries = self.client.list_files(&root_id).await?;

        let mut photos = Vec::new();
        for entry in entries.iter().filter(|e| is_image_entry(e)) {
            match decode_file_entry(entry, &self.default_uploader) {
                Ok(record) => photos.push(record),
                Err(e) => warn!(error = %e, "Skipping undecodable Drime entry"),
            }
        }
        debug!(count = photos.len(), total = entries.len(), "Listed Drime photos");
        Ok(photos)
    }

    fn upload(&self, file: PhotoFile, uploader: &str) -> UploadHandle {
        let Some(folder_id) = self.root_id() else {
            return UploadHandle::ready(Err(StorageError::NotReady));
        };
        if let Err(e) = check_file_size(&file, self.max_file_size) {
            return UploadHandle::ready(Err(e));
        }

        let client = self.client.clone();
        let uploader = uploader.to_string();
        UploadHandle::new(move |progress| async move {
            let size = file.len();
            let uploaded = client.upload_file(file, &folder_id, progress).await?;
            Ok(PhotoRecord {
                id: uploaded.id,
                name: uploaded.name,
                content: PhotoContent::Remote { url: uploaded.url },
                thumbnail: None,
                size: Some(size),
                uploaded_at: Utc::now(),
                uploaded_by: uploader,
            })
        })
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        match self.client.delete_file(id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(id, "Drime delete of unknown id ignored");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn storage_usage(&self) -> Result<StorageUsage, StorageError> {
        self.client.usage().await
    }
}
