//! Decides which backend is authoritative.
//!
//! The remote backend is tried once at startup. Any remote list or upload
//! failure demotes the process to local persistence for the rest of its
//! lifetime; the remote adapter is dropped at that point, so nothing after
//! demotion can reach the vendor.

use tracing::{info, warn};

use familycloud_common::backend::{PhotoBackend, StorageError};
use familycloud_common::documents::{BackendKind, PhotoFile, PhotoRecord, StorageUsage};

use crate::backend::drime::DrimeAdapter;
use crate::backend::local::LocalAdapter;

pub enum ActiveBackend<R> {
    Uninitialized(R),
    Remote(R),
    Local,
}

pub struct Coordinator<R = DrimeAdapter> {
    state: ActiveBackend<R>,
    local: LocalAdapter,
}

impl<R: PhotoBackend> Coordinator<R> {
    pub fn new(remote: R, local: LocalAdapter) -> Self {
        Self {
            state: ActiveBackend::Uninitialized(remote),
            local,
        }
    }

    /// A coordinator with no remote backend configured.
    pub fn local_only(local: LocalAdapter) -> Self {
        Self {
            state: ActiveBackend::Local,
            local,
        }
    }

    /// Bring up the remote backend if that has not been attempted yet.
    pub async fn start(&mut self) -> BackendKind {
        if let ActiveBackend::Uninitialized(remote) = &self.state {
            if remote.init().await {
                self.promote_initial();
                info!("Remote backend active");
            } else {
                self.state = ActiveBackend::Local;
                info!("Remote backend unavailable, using local persistence");
            }
        }
        self.active_kind()
    }

    fn promote_initial(&mut self) {
        let previous = std::mem::replace(&mut self.state, ActiveBackend::Local);
        self.state = match previous {
            ActiveBackend::Uninitialized(remote) => ActiveBackend::Remote(remote),
            other => other,
        };
    }

    /// `None` until [`start`](Self::start) has run.
    pub fn kind(&self) -> Option<BackendKind> {
        match self.state {
            ActiveBackend::Uninitialized(_) => None,
            ActiveBackend::Remote(_) => Some(BackendKind::Remote),
            ActiveBackend::Local => Some(BackendKind::Local),
        }
    }

    fn active_kind(&self) -> BackendKind {
        self.kind().unwrap_or(BackendKind::Local)
    }

    pub fn is_demoted(&self) -> bool {
        matches!(self.state, ActiveBackend::Local)
    }

    pub fn local(&self) -> &LocalAdapter {
        &self.local
    }

    /// Switch to local persistence for the rest of the process.
    pub fn demote(&mut self, reason: &StorageError) {
        if !matches!(self.state, ActiveBackend::Local) {
            warn!(error = %reason, "Demoting to local persistence");
            self.state = ActiveBackend::Local;
        }
    }

    /// Per-file size ceiling of the backend that would take the next upload.
    pub fn max_file_size(&self) -> u64 {
        match &self.state {
            ActiveBackend::Uninitialized(remote) | ActiveBackend::Remote(remote) => remote.max_file_size(),
            ActiveBackend::Local => self.local.max_file_size(),
        }
    }

    pub async fn list_photos(&mut self) -> Result<Vec<PhotoRecord>, StorageError> {
        self.start().await;
        let result = match &self.state {
            ActiveBackend::Remote(remote) => remote.list_photos().await,
            _ => return self.local.list_photos().await,
        };
        if let Err(e) = &result {
            self.demote(e);
        }
        result
    }

    /// Upload one file, falling back to local storage if the remote fails.
    ///
    /// Returns the backend that accepted the file.
    pub async fn upload<P>(
        &mut self,
        file: PhotoFile,
        uploader: &str,
        mut on_progress: P,
    ) -> Result<(BackendKind, PhotoRecord), StorageError>
    where
        P: FnMut(u8),
    {
        self.start().await;
        if let ActiveBackend::Remote(remote) = &self.state {
            match remote.upload(file.clone(), uploader).finish(&mut on_progress).await {
                Ok(record) => return Ok((BackendKind::Remote, record)),
                // Refused before any transfer; the remote is still healthy.
                Err(e @ StorageError::TooLarge { .. }) => return Err(e),
                Err(e) => {
                    warn!(name = %file.name, error = %e, "Remote upload failed, retrying locally");
                    self.demote(&e);
                }
            }
        }

        let record = self.local.upload(file, uploader).finish(on_progress).await?;
        Ok((BackendKind::Local, record))
    }

    /// Delete on the active backend. Remote failures are reported but do not
    /// demote: the photo only exists remotely, local storage cannot stand in.
    pub async fn delete(&mut self, id: &str) -> Result<(), StorageError> {
        self.start().await;
        match &self.state {
            ActiveBackend::Remote(remote) => remote.delete(id).await,
            _ => self.local.delete(id).await,
        }
    }

    pub async fn storage_usage(&mut self) -> Result<StorageUsage, StorageError> {
        self.start().await;
        match &self.state {
            ActiveBackend::Remote(remote) => remote.storage_usage().await,
            _ => self.local.storage_usage().await,
        }
    }
}
