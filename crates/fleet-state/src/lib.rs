//! Fleet-State: persistence for the fleet release orchestrator
//!
//! This crate owns every piece of state that outlives a single build run:
//! the release manifest published to the distribution repository and the
//! shared coordination store used for cross-invocation exclusivity.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: the manifest is always valid JSON on disk, and markers expire.
//!
//! ## Key Components
//!
//! - `ReleaseManifest`: JSON document keyed by short version
//! - `JsonManifestStore`: atomic load/save of the manifest file
//! - `FsCoordinationStore`: directory-backed busy/waiting markers and flags

mod error;
pub mod fakes;
mod fs_coordination;
pub mod manifest;
mod manifest_file;
pub mod storage_traits;

pub use error::StorageError;
pub use fs_coordination::FsCoordinationStore;
pub use manifest::{LatestPointers, ReleaseEntry, ReleaseManifest, ReleaseType, ServiceRelease};
pub use manifest_file::JsonManifestStore;
pub use storage_traits::{CoordinationStore, ManifestStore, Marker, StorageResult};
