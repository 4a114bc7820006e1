//! Release manifest schema.
//!
//! The manifest is a single JSON object. The `latest` key holds the two
//! pointer strings; every other key is a short version (`"1.3.0"`) mapping to
//! the release entry published under it:
//!
//! ```json
//! {
//!   "latest": { "user": "1.3.0.main.3f2a9c1.20261016120000.amd64.9b1c2d3e", "dev": "..." },
//!   "1.3.0": {
//!     "type": "minor",
//!     "commit": "3f2a9c1",
//!     "services": {
//!       "gateway": {
//!         "version": "1.3.0.main.3f2a9c1.20261016120000.amd64.9b1c2d3e",
//!         "repository": "https://github.com/example/gateway",
//!         "binaries": { "linux-amd64": "releases/1.3.0/linux-amd64/gateway" }
//!       }
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of release that produced a manifest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseType {
    Major,
    Minor,
    Patch,
}

impl ReleaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseType::Major => "major",
            ReleaseType::Minor => "minor",
            ReleaseType::Patch => "patch",
        }
    }
}

impl fmt::Display for ReleaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two "latest" pointers, both holding a canonical long-form version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestPointers {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub dev: String,
}

/// One service as published under a release entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRelease {
    /// Full long-form version of the build.
    pub version: String,
    /// Source repository URL.
    #[serde(default)]
    pub repository: String,
    /// Platform identifier → path relative to the distribution root.
    #[serde(default)]
    pub binaries: BTreeMap<String, String>,
}

/// A release keyed by short version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEntry {
    #[serde(rename = "type")]
    pub release_type: ReleaseType,
    /// Source commit the release was cut from.
    #[serde(default)]
    pub commit: String,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceRelease>,
}

impl ReleaseEntry {
    pub fn new(release_type: ReleaseType, commit: impl Into<String>) -> Self {
        Self {
            release_type,
            commit: commit.into(),
            services: BTreeMap::new(),
        }
    }
}

/// The whole manifest document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseManifest {
    #[serde(default)]
    pub latest: LatestPointers,

    #[serde(flatten)]
    pub releases: BTreeMap<String, ReleaseEntry>,
}

impl ReleaseManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every long-form version recorded for `service_id`, across all entries.
    pub fn service_versions(&self, service_id: &str) -> Vec<&str> {
        self.releases
            .values()
            .filter_map(|entry| entry.services.get(service_id))
            .map(|svc| svc.version.as_str())
            .collect()
    }

    /// Fetch the entry for `short_version`, creating it if needed.
    ///
    /// An existing entry keeps its services (a republish merges into it) but
    /// takes the new release type and commit.
    pub fn upsert_release(
        &mut self,
        short_version: &str,
        release_type: ReleaseType,
        commit: &str,
    ) -> &mut ReleaseEntry {
        let entry = self
            .releases
            .entry(short_version.to_string())
            .or_insert_with(|| ReleaseEntry::new(release_type, commit));
        entry.release_type = release_type;
        entry.commit = commit.to_string();
        entry
    }

    /// Short versions that share `major` but differ in minor from `keep_minor`.
    pub fn superseded_minors(&self, major: u64, keep_minor: u64) -> Vec<String> {
        self.releases
            .keys()
            .filter(|key| match major_minor(key) {
                Some((maj, min)) => maj == major && min != keep_minor,
                None => false,
            })
            .cloned()
            .collect()
    }

    /// Remove the given entries, returning the keys that were present.
    pub fn remove_releases(&mut self, keys: &[String]) -> Vec<String> {
        keys.iter()
            .filter(|key| self.releases.remove(key.as_str()).is_some())
            .cloned()
            .collect()
    }

    /// Point both `latest.user` and `latest.dev` at `full_version`.
    pub fn set_latest(&mut self, full_version: &str) {
        self.latest.user = full_version.to_string();
        self.latest.dev = full_version.to_string();
    }
}

/// Leading `major.minor` of a short-version key.
fn major_minor(key: &str) -> Option<(u64, u64)> {
    let mut parts = key.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}
