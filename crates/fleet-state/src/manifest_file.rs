use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StorageError;
use crate::manifest::ReleaseManifest;
use crate::storage_traits::{ManifestStore, StorageResult};

/// Manifest stored as a pretty-printed JSON file.
///
/// Writes go to a temp file in the same directory which is then renamed over
/// the target, so the file on disk is always a complete document.
pub struct JsonManifestStore {
    path: PathBuf,
}

impl JsonManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ManifestStore for JsonManifestStore {
    async fn load(&self) -> StorageResult<ReleaseManifest> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "manifest absent, starting empty");
                return Ok(ReleaseManifest::new());
            }
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        if raw.trim().is_empty() {
            return Ok(ReleaseManifest::new());
        }

        serde_json::from_str(&raw).map_err(|e| StorageError::ManifestCorrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    async fn save(&self, manifest: &ReleaseManifest) -> StorageResult<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;

        let mut body = serde_json::to_vec_pretty(manifest)?;
        body.push(b'\n');

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| StorageError::io(&dir, e))?;
        tmp.write_all(&body)
            .map_err(|e| StorageError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| StorageError::io(&self.path, e.error))?;

        debug!(path = %self.path.display(), releases = manifest.releases.len(), "manifest saved");
        Ok(())
    }
}
