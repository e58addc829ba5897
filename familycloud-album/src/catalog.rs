//! The in-memory photo catalog the front-end talks to.
//!
//! Records are kept in upload order (most recent last). Every mutation is
//! followed by a synchronous snapshot write to the `cachedPhotos` slot so a
//! later failed refresh has something to show.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use familycloud_common::backend::{PhotoBackend, StorageError};
use familycloud_common::documents::{BackendKind, PhotoFile, PhotoRecord, StorageUsage};

use crate::backend::drime::DrimeAdapter;
use crate::coordinator::Coordinator;
use crate::slots::{read_json, write_json, SlotStore, CATALOG_SNAPSHOT_SLOT};

/// Number of photos shown in the dashboard preview.
pub const RECENT_PHOTOS: usize = 6;

/// Where the catalog contents came from on the last refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshSource {
    Backend(BackendKind),
    Snapshot,
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileFailure {
    pub name: String,
    pub reason: String,
}

/// Outcome of a multi-file upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Files accepted by the remote backend.
    pub remote: usize,
    /// Files stored locally, including remote failures retried locally.
    pub local: usize,
    /// Files refused before upload (size ceiling).
    pub rejected: Vec<FileFailure>,
    /// Files that failed on every backend tried.
    pub failed: Vec<FileFailure>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.remote + self.local
    }

    pub fn unsuccessful(&self) -> usize {
        self.rejected.len() + self.failed.len()
    }
}

pub struct Catalog<R = DrimeAdapter> {
    photos: Vec<PhotoRecord>,
    coordinator: Coordinator<R>,
    cache: Arc<dyn SlotStore>,
}

impl<R: PhotoBackend> Catalog<R> {
    pub fn new(coordinator: Coordinator<R>, cache: Arc<dyn SlotStore>) -> Self {
        Self {
            photos: Vec::new(),
            coordinator,
            cache,
        }
    }

    pub fn photos(&self) -> &[PhotoRecord] {
        &self.photos
    }

    pub fn len(&self) -> usize {
        self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }

    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.coordinator.kind()
    }

    pub fn coordinator(&self) -> &Coordinator<R> {
        &self.coordinator
    }

    /// Reload from the active backend, falling back to the last snapshot.
    pub async fn refresh(&mut self) -> RefreshSource {
        match self.coordinator.list_photos().await {
            Ok(photos) => {
                self.photos = photos;
                self.persist_snapshot();
                let kind = self.coordinator.kind().unwrap_or(BackendKind::Local);
                info!(count = self.photos.len(), backend = %kind, "Catalog refreshed");
                RefreshSource::Backend(kind)
            }
            Err(e) => {
                warn!(error = %e, "Refresh failed, falling back to cached snapshot");
                match self.load_snapshot() {
                    Some(photos) => {
                        self.photos = photos;
                        RefreshSource::Snapshot
                    }
                    None => {
                        self.photos.clear();
                        RefreshSource::Empty
                    }
                }
            }
        }
    }

    pub fn add(&mut self, record: PhotoRecord) {
        self.photos.push(record);
        self.persist_snapshot();
    }

    /// Remove by id. Unknown ids are ignored.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.photos.len();
        self.photos.retain(|p| p.id != id);
        let removed = self.photos.len() != before;
        if removed {
            self.persist_snapshot();
        }
        removed
    }

    /// Delete on the active backend, then drop the record locally.
    pub async fn delete(&mut self, id: &str) -> Result<(), StorageError> {
        self.coordinator.delete(id).await?;
        self.remove(id);
        Ok(())
    }

    /// Upload `files` strictly in order.
    ///
    /// Oversize files are rejected one by one without aborting the batch.
    /// Aggregate progress `(resolved * 100 + current) / n` is published on
    /// `progress` when given and always ends at 100.
    pub async fn upload_batch(
        &mut self,
        files: Vec<PhotoFile>,
        uploader: &str,
        progress: Option<&watch::Sender<f64>>,
    ) -> BatchReport {
        let total = files.len().max(1) as f64;
        let mut report = BatchReport::default();
        let publish = |value: f64| {
            if let Some(tx) = progress {
                tx.send_if_modified(|current| {
                    if value > *current {
                        *current = value;
                        true
                    } else {
                        false
                    }
                });
            }
        };
        publish(0.0);

        for (resolved, file) in files.into_iter().enumerate() {
            let limit = self.coordinator.max_file_size();
            if file.len() > limit {
                let reason = format!(
                    "{} is too large ({} bytes, limit {})",
                    file.name,
                    file.len(),
                    limit
                );
                debug!(name = %file.name, size = file.len(), limit, "Rejected oversize file");
                report.rejected.push(FileFailure { name: file.name, reason });
                publish((resolved + 1) as f64 * 100.0 / total);
                continue;
            }

            let name = file.name.clone();
            let base = resolved as f64 * 100.0;
            let result = self
                .coordinator
                .upload(file, uploader, |pct| publish((base + pct as f64) / total))
                .await;
            match result {
                Ok((kind, record)) => {
                    match kind {
                        BackendKind::Remote => report.remote += 1,
                        BackendKind::Local => report.local += 1,
                    }
                    self.add(record);
                }
                Err(e) => {
                    warn!(name = %name, error = %e, "Upload failed");
                    report.failed.push(FileFailure { name, reason: e.to_string() });
                }
            }
            publish((resolved + 1) as f64 * 100.0 / total);
        }

        publish(100.0);
        info!(
            remote = report.remote,
            local = report.local,
            rejected = report.rejected.len(),
            failed = report.failed.len(),
            "Upload batch complete"
        );
        report
    }

    /// Remote: vendor-reported usage. Local: size of the serialized catalog
    /// against the local capacity ceiling.
    pub async fn usage(&mut self) -> Result<StorageUsage, StorageError> {
        match self.coordinator.kind() {
            Some(BackendKind::Remote) => self.coordinator.storage_usage().await,
            _ => {
                let used = serde_json::to_string(&self.photos)
                    .map(|s| s.len() as u64)
                    .map_err(|e| StorageError::Persistence(e.to_string()))?;
                Ok(StorageUsage {
                    used,
                    total: self.coordinator.local().capacity(),
                })
            }
        }
    }

    /// Case-insensitive match on `uploaded_by`.
    pub fn filter_by_uploader(&self, label: &str) -> Vec<&PhotoRecord> {
        let wanted = label.to_lowercase();
        self.photos
            .iter()
            .filter(|p| p.uploaded_by.to_lowercase() == wanted)
            .collect()
    }

    /// The last `n` photos, most recent first.
    pub fn recent(&self, n: usize) -> Vec<&PhotoRecord> {
        self.photos.iter().rev().take(n).collect()
    }

    fn persist_snapshot(&self) {
        if let Err(e) = write_json(self.cache.as_ref(), CATALOG_SNAPSHOT_SLOT, &self.photos) {
            warn!(error = %e, "Failed to write catalog snapshot");
        }
    }

    fn load_snapshot(&self) -> Option<Vec<PhotoRecord>> {
        match read_json(self.cache.as_ref(), CATALOG_SNAPSHOT_SLOT) {
            Ok(photos) => photos,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable catalog snapshot");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use chrono::Utc;
    use familycloud_common::documents::PhotoContent;

    use super::*;
    use crate::coordinator::tests::{local_adapter, ScriptedBackend};
    use crate::slots::MemorySlotStore;

    fn record(id: &str, uploader: &str) -> PhotoRecord {
        PhotoRecord {
            id: id.to_string(),
            name: format!("{}.jpg", id),
            content: PhotoContent::Remote { url: format!("https://cdn.example/{}", id) },
            thumbnail: None,
            size: None,
            uploaded_at: Utc::now(),
            uploaded_by: uploader.to_string(),
        }
    }

    fn catalog(remote: &ScriptedBackend) -> (Catalog<ScriptedBackend>, Arc<MemorySlotStore>) {
        let cache = Arc::new(MemorySlotStore::new());
        let coordinator = Coordinator::new(remote.clone(), local_adapter());
        (Catalog::new(coordinator, cache.clone()), cache)
    }

    fn jpeg(name: &str, size: usize) -> PhotoFile {
        PhotoFile::new(name, "image/jpeg", vec![9u8; size])
    }

    #[tokio::test]
    async fn test_refresh_from_remote_writes_snapshot() {
        let remote = ScriptedBackend::ready();
        remote.script.photos.lock().unwrap().push(record("1", "mama"));
        let (mut catalog, cache) = catalog(&remote);

        assert_eq!(catalog.refresh().await, RefreshSource::Backend(BackendKind::Remote));
        assert_eq!(catalog.len(), 1);
        let snapshot: Vec<PhotoRecord> = read_json(cache.as_ref(), CATALOG_SNAPSHOT_SLOT).unwrap().unwrap();
        assert_eq!(snapshot, catalog.photos());
    }

    #[tokio::test]
    async fn test_refresh_failure_uses_snapshot() {
        let remote = ScriptedBackend::ready();
        remote.script.photos.lock().unwrap().push(record("1", "mama"));
        let (mut catalog, _cache) = catalog(&remote);
        catalog.refresh().await;

        remote.script.fail_list.store(true, Ordering::SeqCst);
        assert_eq!(catalog.refresh().await, RefreshSource::Snapshot);
        assert_eq!(catalog.backend_kind(), Some(BackendKind::Local));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.photos()[0].id, "1");
    }

    #[tokio::test]
    async fn test_refresh_failure_without_snapshot_is_empty() {
        let remote = ScriptedBackend::ready();
        remote.script.fail_list.store(true, Ordering::SeqCst);
        let (mut catalog, _cache) = catalog(&remote);
        catalog.add(record("stale", "mama"));
        catalog.cache.remove(CATALOG_SNAPSHOT_SLOT).unwrap();

        assert_eq!(catalog.refresh().await, RefreshSource::Empty);
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn test_batch_with_interspersed_failures() {
        let remote = ScriptedBackend::ready();
        let (mut catalog, _cache) = catalog(&remote);
        catalog.refresh().await;

        // Local ceiling is 5 MiB; after demotion the 6 MiB file is refused.
        remote.fail_upload_of("c.jpg");
        let files = vec![
            jpeg("a.jpg", 10),
            jpeg("b.jpg", 10),
            jpeg("c.jpg", 10),
            jpeg("d.jpg", 6 * 1024 * 1024),
            jpeg("e.jpg", 10),
        ];
        let (tx, rx) = watch::channel(0.0);
        let report = catalog.upload_batch(files, "mama", Some(&tx)).await;

        assert_eq!(report.remote, 2);
        assert_eq!(report.local, 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].name, "d.jpg");
        assert!(report.failed.is_empty());
        assert_eq!(report.succeeded(), 4);
        assert_eq!(*rx.borrow(), 100.0);

        let names: Vec<&str> = catalog.photos().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "c.jpg", "e.jpg"]);
        assert!(!catalog.photos()[1].is_embedded());
        assert!(catalog.photos()[2].is_embedded());
    }

    #[tokio::test]
    async fn test_batch_counts_files_lost_on_both_backends() {
        let remote = ScriptedBackend::ready();
        let (mut catalog, _cache) = catalog(&remote);
        catalog.refresh().await;

        // b.jpg fails remotely and is over the 5 MiB local ceiling; e.jpg
        // pushes the local slot past its 10 MiB capacity.
        remote.fail_upload_of("b.jpg");
        let files = vec![
            jpeg("a.jpg", 1024),
            jpeg("b.jpg", 6 * 1024 * 1024),
            jpeg("c.jpg", 3 * 1024 * 1024),
            jpeg("d.jpg", 3 * 1024 * 1024),
            jpeg("e.jpg", 3 * 1024 * 1024),
            jpeg("f.jpg", 1024),
        ];
        let (tx, rx) = watch::channel(0.0);
        let report = catalog.upload_batch(files, "mama", Some(&tx)).await;

        assert_eq!(report.remote, 1);
        assert_eq!(report.local, 3);
        assert!(report.rejected.is_empty());
        let failed: Vec<&str> = report.failed.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(failed, vec!["b.jpg", "e.jpg"]);
        assert_eq!(report.remote + report.local + report.failed.len(), 6);
        assert_eq!(report.unsuccessful(), 2);
        assert_eq!(*rx.borrow(), 100.0);

        let names: Vec<&str> = catalog.photos().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "c.jpg", "d.jpg", "f.jpg"]);
        assert_eq!(catalog.coordinator().local().list_photos().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let remote = ScriptedBackend::ready();
        let (mut catalog, _cache) = catalog(&remote);
        let (tx, mut rx) = watch::channel(0.0);

        let watcher = tokio::spawn(async move {
            let mut seen = vec![*rx.borrow_and_update()];
            while rx.changed().await.is_ok() {
                seen.push(*rx.borrow_and_update());
            }
            seen
        });

        let files = vec![jpeg("a.jpg", 10), jpeg("b.jpg", 10)];
        catalog.upload_batch(files, "mama", Some(&tx)).await;
        drop(tx);

        let seen = watcher.await.unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last(), Some(&100.0));
    }

    #[tokio::test]
    async fn test_delete_and_remove() {
        let remote = ScriptedBackend::ready();
        let (mut catalog, cache) = catalog(&remote);
        catalog.refresh().await;
        let report = catalog.upload_batch(vec![jpeg("a.jpg", 10)], "mama", None).await;
        assert_eq!(report.remote, 1);
        let id = catalog.photos()[0].id.clone();

        catalog.delete(&id).await.unwrap();
        assert!(catalog.is_empty());
        assert!(remote.script.photos.lock().unwrap().is_empty());
        let snapshot: Vec<PhotoRecord> = read_json(cache.as_ref(), CATALOG_SNAPSHOT_SLOT).unwrap().unwrap();
        assert!(snapshot.is_empty());

        assert!(!catalog.remove("never-existed"));
        catalog.delete("never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn test_filter_by_uploader_is_case_insensitive() {
        let remote = ScriptedBackend::ready();
        let (mut catalog, _cache) = catalog(&remote);
        catalog.add(record("1", "Mama"));
        catalog.add(record("2", "papa"));
        catalog.add(record("3", "mama"));

        let upper: Vec<&str> = catalog.filter_by_uploader("Mama").iter().map(|p| p.id.as_str()).collect();
        let lower: Vec<&str> = catalog.filter_by_uploader("mama").iter().map(|p| p.id.as_str()).collect();
        assert_eq!(upper, lower);
        assert_eq!(upper, vec!["1", "3"]);
        assert!(catalog.filter_by_uploader("opa").is_empty());
    }

    #[tokio::test]
    async fn test_recent_is_most_recent_first() {
        let remote = ScriptedBackend::ready();
        let (mut catalog, _cache) = catalog(&remote);
        for i in 0..8 {
            catalog.add(record(&i.to_string(), "mama"));
        }
        let recent: Vec<&str> = catalog.recent(RECENT_PHOTOS).iter().map(|p| p.id.as_str()).collect();
        assert_eq!(recent, vec!["7", "6", "5", "4", "3", "2"]);
    }

    #[tokio::test]
    async fn test_usage_per_backend() {
        let remote = ScriptedBackend::ready();
        let (mut catalog, _cache) = catalog(&remote);
        catalog.refresh().await;
        assert_eq!(catalog.usage().await.unwrap().total, 20 * 1024 * 1024 * 1024);

        let broken = ScriptedBackend::broken();
        let (mut local_catalog, _cache) = self::catalog(&broken);
        local_catalog.refresh().await;
        local_catalog.add(record("1", "mama"));
        let usage = local_catalog.usage().await.unwrap();
        let expected = serde_json::to_string(local_catalog.photos()).unwrap().len() as u64;
        assert_eq!(usage.used, expected);
        assert_eq!(usage.total, 10 * 1024 * 1024);
    }
}
