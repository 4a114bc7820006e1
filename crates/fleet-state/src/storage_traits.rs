//! Storage trait definitions for fleet
//!
//! These traits define the two persistence seams of the orchestrator:
//! - `ManifestStore`: whole-document load/save of the release manifest
//! - `CoordinationStore`: expiring markers and flags shared between
//!   concurrent invocations (build runs, scheduled agents, services)
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::manifest::ReleaseManifest;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ManifestStore: release manifest persistence
// ---------------------------------------------------------------------------

/// Release manifest persistence.
///
/// Guarantees:
/// - `load` on a store that was never saved returns an empty manifest.
/// - `save` replaces the whole document in one step; a reader never sees a
///   partially written manifest.
#[async_trait]
pub trait ManifestStore: Send + Sync {
    /// Load the current manifest.
    async fn load(&self) -> StorageResult<ReleaseManifest>;

    /// Replace the stored manifest with `manifest`.
    async fn save(&self, manifest: &ReleaseManifest) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// CoordinationStore: cross-invocation markers
// ---------------------------------------------------------------------------

/// An expiring marker, e.g. `busy:fleet-build:<holder>` or `waiting:<holder>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub key: String,
    /// Identity of whoever wrote the marker.
    pub holder: String,
    pub expires_at: DateTime<Utc>,
}

impl Marker {
    pub fn new(key: &str, holder: &str, ttl: Duration) -> Self {
        Self {
            key: key.to_string(),
            holder: holder.to_string(),
            expires_at: expiry_from(Utc::now(), ttl),
        }
    }

    /// Whether the marker is still in force at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

pub(crate) fn expiry_from(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now + chrono::Duration::milliseconds(ttl.as_millis().min(i64::MAX as u128) as i64)
}

/// Shared coordination store.
///
/// Semantics:
/// - `put_marker` creates or refreshes a marker; refreshing moves its expiry.
/// - `live_markers` never returns expired markers.
/// - Flags are plain strings without expiry, written by external actors
///   (e.g. `system:idle`, `system:cooldown_until`).
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Create or refresh a marker that expires `ttl` from now.
    async fn put_marker(&self, key: &str, holder: &str, ttl: Duration) -> StorageResult<Marker>;

    /// Remove a marker. No-op if absent.
    async fn remove_marker(&self, key: &str) -> StorageResult<()>;

    /// All unexpired markers whose key starts with `prefix`.
    async fn live_markers(&self, prefix: &str) -> StorageResult<Vec<Marker>>;

    /// Read a flag.
    async fn flag(&self, key: &str) -> StorageResult<Option<String>>;

    /// Write a flag; `None` clears it.
    async fn set_flag(&self, key: &str, value: Option<&str>) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_liveness_follows_expiry() {
        let marker = Marker::new("busy:api", "run-1", Duration::from_secs(5));
        let now = Utc::now();
        assert!(marker.is_live(now));
        assert!(!marker.is_live(now + chrono::Duration::seconds(6)));
    }

    #[test]
    fn expiry_handles_zero_ttl() {
        let now = Utc::now();
        assert_eq!(expiry_from(now, Duration::ZERO), now);
    }
}
