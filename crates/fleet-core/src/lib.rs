//! Fleet Core Library
//!
//! Domain types and the components of a `build` run: version resolution,
//! planning, install, git and release publishing, the build lease and the
//! orchestrator that drives them. Stage execution lives in `fleet-ci`.

pub mod config;
pub mod context;
pub mod domain;
pub mod git;
pub mod git_publisher;
pub mod install;
pub mod lease;
pub mod obs;
pub mod orchestrator;
pub mod pipeline;
pub mod planner;
pub mod release_publisher;
pub mod resolver;
pub mod summary;
pub mod telemetry;

pub use config::{FleetConfig, DEFAULT_CONFIG_FILE};
pub use context::RunContext;
pub use domain::{
    host_arch, BuildPlan, BuildTask, Category, FleetError, IncrementKind, ParsedVersion, Result,
    ServiceDefinition, Toolchain, Version, VersionCore, VersionParseError,
};

pub use git::{capture_head_sha, is_git_repo};
pub use git_publisher::{GitOutcome, GitPublisher, TagStatus};
pub use install::{systemctl, InstallManager, InstallOutcome};
pub use lease::{Blocker, LeaseGuard, LeaseManager};
pub use obs::{
    emit_build_finished, emit_build_started, emit_distribution_failed, emit_service_built,
    emit_service_failed, emit_stage_finished, BuildSpan,
};
pub use orchestrator::{
    BuildOrchestrator, BuildReport, Collaborators, DistributionOutcome, ServiceReport,
};
pub use pipeline::{
    BuildArtifact, PipelineOutcome, PipelineRunner, StageReport, StageStatus,
};
pub use planner::{PlanOptions, ServiceState};
pub use release_publisher::{BuiltService, PublishReport, ReleasePublisher};
pub use resolver::{ResolvedVersion, VersionResolver};
pub use summary::{BuildSummary, SummaryRow};
