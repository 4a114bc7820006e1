//! Per-run build work: the requested increment, tasks and the plan.

use std::fmt;
use std::str::FromStr;

use fleet_state::ReleaseType;
use serde::Serialize;

use crate::domain::error::FleetError;
use crate::domain::service::ServiceDefinition;
use crate::domain::version::VersionCore;

/// Increment requested on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IncrementKind {
    Major,
    Minor,
    Patch,
    /// No argument given: patch semantics over changed services.
    #[default]
    Auto,
}

impl IncrementKind {
    /// Release type recorded in the manifest.
    pub fn release_type(self) -> ReleaseType {
        match self {
            IncrementKind::Major => ReleaseType::Major,
            IncrementKind::Minor => ReleaseType::Minor,
            IncrementKind::Patch | IncrementKind::Auto => ReleaseType::Patch,
        }
    }

    /// Whether the whole buildable fleet is synchronised to one version.
    pub fn is_fleet_wide(self) -> bool {
        matches!(self, IncrementKind::Major | IncrementKind::Minor)
    }

    /// Parse an optional command-line argument; `None` means `auto`.
    pub fn from_arg(arg: Option<&str>) -> Result<Self, FleetError> {
        arg.map_or(Ok(IncrementKind::Auto), str::parse)
    }
}

impl FromStr for IncrementKind {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "major" => Ok(IncrementKind::Major),
            "minor" => Ok(IncrementKind::Minor),
            "patch" => Ok(IncrementKind::Patch),
            "auto" => Ok(IncrementKind::Auto),
            _ => Err(FleetError::InvalidIncrement(s.to_string())),
        }
    }
}

impl fmt::Display for IncrementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IncrementKind::Major => "major",
            IncrementKind::Minor => "minor",
            IncrementKind::Patch => "patch",
            IncrementKind::Auto => "auto",
        })
    }
}

/// One service to build, with the version it was planned from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildTask {
    pub service: ServiceDefinition,
    pub current: VersionCore,
    pub target: VersionCore,
}

/// Output of the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildPlan {
    pub increment: IncrementKind,
    pub release_type: ReleaseType,
    pub tasks: Vec<BuildTask>,
}

impl BuildPlan {
    pub fn noop(increment: IncrementKind) -> Self {
        Self {
            increment,
            release_type: increment.release_type(),
            tasks: Vec::new(),
        }
    }

    /// Nothing to build; the run ends here.
    pub fn is_noop(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn service_ids(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.service.id.as_str()).collect()
    }
}
