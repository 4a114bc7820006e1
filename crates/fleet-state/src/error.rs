//! Error types for fleet-state

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the state persistence layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Filesystem operation failed
    #[error("I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifest exists but cannot be parsed
    #[error("manifest at {path} is not valid: {reason}")]
    ManifestCorrupt { path: PathBuf, reason: String },

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Coordination key cannot be stored
    #[error("invalid coordination key: {key:?}")]
    InvalidKey { key: String },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_mentions_path() {
        let err = StorageError::io(
            "/srv/dist/manifest.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/srv/dist/manifest.json"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn invalid_key_display() {
        let err = StorageError::InvalidKey { key: "".to_string() };
        assert!(err.to_string().contains("invalid coordination key"));
    }
}
