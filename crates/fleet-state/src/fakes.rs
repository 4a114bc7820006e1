//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryManifestStore` and `MemoryCoordinationStore` that satisfy
//! the trait contracts without touching the filesystem.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::manifest::ReleaseManifest;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryManifestStore
// ---------------------------------------------------------------------------

/// In-memory manifest store that counts saves.
#[derive(Debug, Default)]
pub struct MemoryManifestStore {
    manifest: Mutex<ReleaseManifest>,
    saves: AtomicUsize,
    read_only: AtomicBool,
}

impl MemoryManifestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing document.
    pub fn with_manifest(manifest: ReleaseManifest) -> Self {
        Self {
            manifest: Mutex::new(manifest),
            ..Default::default()
        }
    }

    /// Make every later `save` fail with a permission error.
    pub fn refuse_saves(&self) {
        self.read_only.store(true, Ordering::SeqCst);
    }

    /// Current stored document.
    pub fn snapshot(&self) -> ReleaseManifest {
        self.manifest.lock().unwrap().clone()
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManifestStore for MemoryManifestStore {
    async fn load(&self) -> StorageResult<ReleaseManifest> {
        Ok(self.manifest.lock().unwrap().clone())
    }

    async fn save(&self, manifest: &ReleaseManifest) -> StorageResult<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StorageError::Io {
                path: PathBuf::from("manifest.json"),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            });
        }
        *self.manifest.lock().unwrap() = manifest.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryCoordinationStore
// ---------------------------------------------------------------------------

/// In-memory coordination store backed by two `HashMap`s.
#[derive(Debug, Default)]
pub struct MemoryCoordinationStore {
    markers: Mutex<HashMap<String, Marker>>,
    flags: Mutex<HashMap<String, String>>,
}

impl MemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored marker, expired or not, sorted by key.
    pub fn all_markers(&self) -> Vec<Marker> {
        let mut all: Vec<Marker> = self.markers.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }
}

#[async_trait]
impl CoordinationStore for MemoryCoordinationStore {
    async fn put_marker(&self, key: &str, holder: &str, ttl: Duration) -> StorageResult<Marker> {
        if key.is_empty() {
            return Err(crate::StorageError::InvalidKey {
                key: key.to_string(),
            });
        }
        let marker = Marker::new(key, holder, ttl);
        self.markers
            .lock()
            .unwrap()
            .insert(key.to_string(), marker.clone());
        Ok(marker)
    }

    async fn remove_marker(&self, key: &str) -> StorageResult<()> {
        self.markers.lock().unwrap().remove(key);
        Ok(())
    }

    async fn live_markers(&self, prefix: &str) -> StorageResult<Vec<Marker>> {
        let now = Utc::now();
        let mut markers = self.markers.lock().unwrap();
        markers.retain(|_, m| m.is_live(now));
        let mut live: Vec<Marker> = markers
            .values()
            .filter(|m| m.key.starts_with(prefix))
            .cloned()
            .collect();
        live.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(live)
    }

    async fn flag(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.flags.lock().unwrap().get(key).cloned())
    }

    async fn set_flag(&self, key: &str, value: Option<&str>) -> StorageResult<()> {
        let mut flags = self.flags.lock().unwrap();
        match value {
            Some(v) => {
                flags.insert(key.to_string(), v.to_string());
            }
            None => {
                flags.remove(key);
            }
        }
        Ok(())
    }
}
