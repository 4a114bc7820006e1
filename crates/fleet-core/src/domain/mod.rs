//! Domain models for fleet builds.
//!
//! - `Version` / `VersionCore`: the long and short version wire forms
//! - `ServiceDefinition`: static identity of a fleet member
//! - `BuildTask` / `BuildPlan`: per-run work computed by the planner
//! - `FleetError`: error taxonomy

pub mod error;
pub mod service;
pub mod task;
pub mod version;

pub use error::{FleetError, Result};
pub use service::{Category, ServiceDefinition, Toolchain};
pub use task::{BuildPlan, BuildTask, IncrementKind};
pub use version::{host_arch, ParsedVersion, Version, VersionCore, VersionParseError};
