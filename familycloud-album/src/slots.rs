//! Named-slot local persistence.
//!
//! Each slot holds one JSON string. The on-disk store keeps every slot in
//! `{data_dir}/{slot}.json` and writes through a temp file and rename so a
//! crash never leaves a half-written slot behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use familycloud_common::backend::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Slot holding the local backend's photos (embedded data URLs).
pub const LOCAL_PHOTOS_SLOT: &str = "familyPhotos";
/// Slot holding the catalog snapshot used when a refresh fails.
pub const CATALOG_SNAPSHOT_SLOT: &str = "cachedPhotos";

#[derive(Debug, thiserror::Error)]
pub enum SlotError {
    #[error("I/O error on slot {slot}: {source}")]
    Io {
        slot: String,
        #[source]
        source: std::io::Error,
    },
    #[error("slot {slot} holds invalid JSON: {source}")]
    Json {
        slot: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid slot name: {0}")]
    BadName(String),
}

impl From<SlotError> for StorageError {
    fn from(e: SlotError) -> Self {
        StorageError::Persistence(e.to_string())
    }
}

/// Synchronous key/value store for JSON strings.
pub trait SlotStore: Send + Sync {
    fn read(&self, slot: &str) -> Result<Option<String>, SlotError>;
    fn write(&self, slot: &str, value: &str) -> Result<(), SlotError>;
    fn remove(&self, slot: &str) -> Result<(), SlotError>;
}

/// Read and deserialize a slot. A missing slot is `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(store: &dyn SlotStore, slot: &str) -> Result<Option<T>, SlotError> {
    match store.read(slot)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| SlotError::Json { slot: slot.to_string(), source }),
        None => Ok(None),
    }
}

/// Serialize `value` and write it to `slot`. Returns the serialized length.
pub fn write_json<T: Serialize + ?Sized>(store: &dyn SlotStore, slot: &str, value: &T) -> Result<usize, SlotError> {
    let raw = serde_json::to_string(value)
        .map_err(|source| SlotError::Json { slot: slot.to_string(), source })?;
    store.write(slot, &raw)?;
    Ok(raw.len())
}

pub struct FileSlotStore {
    dir: PathBuf,
}

impl FileSlotStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SlotError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| SlotError::Io {
            slot: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, slot: &str) -> Result<PathBuf, SlotError> {
        let valid = !slot.is_empty()
            && slot
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(SlotError::BadName(slot.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", slot)))
    }
}

impl SlotStore for FileSlotStore {
    fn read(&self, slot: &str) -> Result<Option<String>, SlotError> {
        let path = self.slot_path(slot)?;
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SlotError::Io { slot: slot.to_string(), source }),
        }
    }

    fn write(&self, slot: &str, value: &str) -> Result<(), SlotError> {
        let path = self.slot_path(slot)?;
        let io_err = |source| SlotError::Io { slot: slot.to_string(), source };

        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, value).map_err(io_err)?;
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(&tmp_path)
            .map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);
        std::fs::rename(&tmp_path, &path).map_err(io_err)?;
        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<(), SlotError> {
        let path = self.slot_path(slot)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SlotError::Io { slot: slot.to_string(), source }),
        }
    }
}

/// In-memory store, for tests and throwaway sessions.
#[derive(Default)]
pub struct MemorySlotStore {
    slots: Mutex<HashMap<String, String>>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SlotStore for MemorySlotStore {
    fn read(&self, slot: &str) -> Result<Option<String>, SlotError> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Ok(slots.get(slot).cloned())
    }

    fn write(&self, slot: &str, value: &str) -> Result<(), SlotError> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.insert(slot.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<(), SlotError> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.remove(slot);
        Ok(())
    }
}
