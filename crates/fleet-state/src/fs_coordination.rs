use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::storage_traits::{CoordinationStore, Marker, StorageResult};

/// Directory-backed coordination store.
///
/// Layout: `<root>/markers/<key>.json` holds a serialized [`Marker`],
/// `<root>/flags/<key>` holds a flag value. Characters outside
/// `[A-Za-z0-9._-]` in keys are written as `_` in file names; the real key is
/// kept inside the marker body.
pub struct FsCoordinationStore {
    markers_dir: PathBuf,
    flags_dir: PathBuf,
}

impl FsCoordinationStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let markers_dir = root.as_ref().join("markers");
        let flags_dir = root.as_ref().join("flags");
        fs::create_dir_all(&markers_dir).map_err(|e| StorageError::io(&markers_dir, e))?;
        fs::create_dir_all(&flags_dir).map_err(|e| StorageError::io(&flags_dir, e))?;
        Ok(Self {
            markers_dir,
            flags_dir,
        })
    }

    fn marker_path(&self, key: &str) -> StorageResult<PathBuf> {
        Ok(self.markers_dir.join(format!("{}.json", file_name(key)?)))
    }

    fn flag_path(&self, key: &str) -> StorageResult<PathBuf> {
        Ok(self.flags_dir.join(file_name(key)?))
    }
}

fn file_name(key: &str) -> StorageResult<String> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect())
}

fn write_atomic(dir: &Path, target: &Path, body: &[u8]) -> StorageResult<()> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StorageError::io(dir, e))?;
    tmp.write_all(body).map_err(|e| StorageError::io(target, e))?;
    tmp.persist(target)
        .map_err(|e| StorageError::io(target, e.error))?;
    Ok(())
}

fn remove_if_present(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

#[async_trait]
impl CoordinationStore for FsCoordinationStore {
    async fn put_marker(&self, key: &str, holder: &str, ttl: Duration) -> StorageResult<Marker> {
        let marker = Marker::new(key, holder, ttl);
        let path = self.marker_path(key)?;
        let body = serde_json::to_vec(&marker)?;
        write_atomic(&self.markers_dir, &path, &body)?;
        Ok(marker)
    }

    async fn remove_marker(&self, key: &str) -> StorageResult<()> {
        remove_if_present(&self.marker_path(key)?)
    }

    async fn live_markers(&self, prefix: &str) -> StorageResult<Vec<Marker>> {
        let now = Utc::now();
        let entries =
            fs::read_dir(&self.markers_dir).map_err(|e| StorageError::io(&self.markers_dir, e))?;

        let mut live = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StorageError::io(&self.markers_dir, e))?.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let raw = match fs::read(&path) {
                Ok(raw) => raw,
                // Removed by a concurrent writer between read_dir and read.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::io(&path, e)),
            };
            let marker: Marker = match serde_json::from_slice(&raw) {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable marker");
                    continue;
                }
            };
            if !marker.is_live(now) {
                debug!(key = %marker.key, "pruning expired marker");
                remove_if_present(&path)?;
                continue;
            }
            if marker.key.starts_with(prefix) {
                live.push(marker);
            }
        }
        live.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(live)
    }

    async fn flag(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.flag_path(key)?;
        match fs::read_to_string(&path) {
            Ok(v) => Ok(Some(v.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }

    async fn set_flag(&self, key: &str, value: Option<&str>) -> StorageResult<()> {
        let path = self.flag_path(key)?;
        match value {
            Some(v) => write_atomic(&self.flags_dir, &path, v.as_bytes()),
            None => remove_if_present(&path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> (tempfile::TempDir, FsCoordinationStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsCoordinationStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn marker_put_and_list_by_prefix() {
        let (_dir, store) = make_store();
        store
            .put_marker("busy:api", "run-a", Duration::from_secs(30))
            .await
            .unwrap();
        store
            .put_marker("waiting:run-b", "run-b", Duration::from_secs(30))
            .await
            .unwrap();

        let busy = store.live_markers("busy:").await.unwrap();
        assert_eq!(busy.len(), 1);
        assert_eq!(busy[0].key, "busy:api");
        assert_eq!(busy[0].holder, "run-a");
    }

    #[tokio::test]
    async fn expired_markers_are_pruned() {
        let (dir, store) = make_store();
        store
            .put_marker("busy:old", "run-a", Duration::ZERO)
            .await
            .unwrap();

        assert!(store.live_markers("busy:").await.unwrap().is_empty());
        let left: Vec<_> = std::fs::read_dir(dir.path().join("markers"))
            .unwrap()
            .collect();
        assert!(left.is_empty());
    }

    #[tokio::test]
    async fn remove_marker_is_idempotent() {
        let (_dir, store) = make_store();
        store
            .put_marker("busy:api", "run-a", Duration::from_secs(30))
            .await
            .unwrap();
        store.remove_marker("busy:api").await.unwrap();
        store.remove_marker("busy:api").await.unwrap();
        assert!(store.live_markers("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn flags_roundtrip_and_clear() {
        let (_dir, store) = make_store();
        assert_eq!(store.flag("system:idle").await.unwrap(), None);

        store.set_flag("system:idle", Some("true")).await.unwrap();
        assert_eq!(
            store.flag("system:idle").await.unwrap().as_deref(),
            Some("true")
        );

        store.set_flag("system:idle", None).await.unwrap();
        assert_eq!(store.flag("system:idle").await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_key_rejected() {
        let (_dir, store) = make_store();
        let err = store
            .put_marker("", "run-a", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey { .. }));
    }
}
