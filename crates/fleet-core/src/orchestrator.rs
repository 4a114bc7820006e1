//! End-to-end `build` run.
//!
//! Plans the run, then drives each task through pipeline, install and git
//! strictly one after another. The first failure aborts the run. When at
//! least one service was built the combined release is published to the
//! distribution repository; a publish failure is reported but does not undo
//! local work.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use fleet_exec::{CommandRunner, MessageGenerator, Notification, Notifier};
use fleet_state::ManifestStore;

use crate::config::FleetConfig;
use crate::context::RunContext;
use crate::domain::error::{FleetError, Result};
use crate::domain::service::ServiceDefinition;
use crate::domain::task::{BuildPlan, BuildTask};
use crate::domain::version::{host_arch, Version};
use crate::git;
use crate::git_publisher::{GitOutcome, GitPublisher};
use crate::install::{InstallManager, InstallOutcome};
use crate::obs;
use crate::pipeline::{BuildArtifact, PipelineRunner, StageStatus};
use crate::planner::{self, PlanOptions, ServiceState};
use crate::release_publisher::{latest_source, BuiltService, PublishReport, ReleasePublisher};
use crate::resolver::{ResolvedVersion, VersionResolver};
use crate::summary::{BuildSummary, SummaryRow};

/// What happened to the distribution step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DistributionOutcome {
    /// Nothing was built.
    NotAttempted,
    Published { report: PublishReport },
    /// Local builds, installs and pushes stand; only distribution failed.
    Failed { reason: String },
}

impl DistributionOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, DistributionOutcome::Failed { .. })
    }
}

/// Per-service result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceReport {
    pub built: BuiltService,
    pub installed: bool,
    pub git: GitOutcome,
    pub size_before: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub run_id: String,
    pub plan: BuildPlan,
    pub services: Vec<ServiceReport>,
    pub summary: BuildSummary,
    pub distribution: DistributionOutcome,
    pub warnings: Vec<String>,
}

impl BuildReport {
    pub fn is_noop(&self) -> bool {
        self.plan.is_noop()
    }

    pub fn built(&self) -> Vec<BuiltService> {
        self.services.iter().map(|s| s.built.clone()).collect()
    }
}

/// External collaborators of a build run.
pub struct Collaborators {
    pub runner: Arc<dyn CommandRunner>,
    pub pipeline: Arc<dyn PipelineRunner>,
    pub messages: Arc<dyn MessageGenerator>,
    pub notifier: Arc<dyn Notifier>,
    pub manifest: Arc<dyn ManifestStore>,
}

pub struct BuildOrchestrator {
    services: Vec<ServiceDefinition>,
    runner: Arc<dyn CommandRunner>,
    pipeline: Arc<dyn PipelineRunner>,
    notifier: Arc<dyn Notifier>,
    resolver: VersionResolver,
    installer: InstallManager,
    git: GitPublisher,
    publisher: ReleasePublisher,
    arch: String,
}

impl BuildOrchestrator {
    pub fn new(config: &FleetConfig, deps: Collaborators) -> Self {
        Self {
            services: config.services.clone(),
            resolver: VersionResolver::new(
                deps.runner.clone(),
                deps.manifest.clone(),
                config.paths.bin_dir.clone(),
            ),
            installer: InstallManager::new(deps.runner.clone(), config),
            git: GitPublisher::new(
                deps.runner.clone(),
                deps.messages,
                config.paths.bin_dir.clone(),
            ),
            publisher: ReleasePublisher::new(
                deps.runner.clone(),
                deps.manifest,
                config.paths.dist_repo.clone(),
                config.paths.platform.clone(),
            ),
            runner: deps.runner,
            pipeline: deps.pipeline,
            notifier: deps.notifier,
            arch: host_arch().to_string(),
        }
    }

    /// Override the architecture stamped into versions.
    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    /// Current state of every configured service.
    pub async fn survey(&self) -> Vec<(ServiceState, ResolvedVersion)> {
        planner::survey(&self.resolver, self.runner.as_ref(), &self.services).await
    }

    pub async fn plan(&self, opts: PlanOptions) -> BuildPlan {
        let states: Vec<ServiceState> = self.survey().await.into_iter().map(|(s, _)| s).collect();
        planner::plan(&states, opts)
    }

    /// Plan and execute a build.
    pub async fn run(&self, ctx: &RunContext, opts: PlanOptions) -> Result<BuildReport> {
        let plan = self.plan(opts).await;
        self.execute(ctx, plan).await
    }

    /// Execute an already computed plan.
    pub async fn execute(&self, ctx: &RunContext, plan: BuildPlan) -> Result<BuildReport> {
        let _span = obs::BuildSpan::enter(&ctx.run_id);
        obs::emit_build_started(&ctx.run_id, &plan.increment.to_string(), plan.tasks.len());

        let mut report = BuildReport {
            run_id: ctx.run_id.clone(),
            plan,
            services: Vec::new(),
            summary: BuildSummary::default(),
            distribution: DistributionOutcome::NotAttempted,
            warnings: Vec::new(),
        };

        if report.plan.is_noop() {
            info!("nothing to build");
            obs::emit_build_finished(&ctx.run_id, ctx.elapsed_ms(), 0, false);
            return Ok(report);
        }

        for task in &report.plan.tasks {
            match self.build_one(ctx, task, report.plan.release_type, &mut report.warnings).await {
                Ok(Some(done)) => report.services.push(done),
                Ok(None) => {}
                Err(e) => {
                    self.report_failure(task, &e).await;
                    return Err(e);
                }
            }
        }

        let built = report.built();
        if let Some(latest) = latest_source(&built) {
            let full = latest.version.clone();
            let short = full.short();
            match self
                .publisher
                .publish(&full, &short, report.plan.release_type, &built)
                .await
            {
                Ok(published) => {
                    report.distribution = DistributionOutcome::Published { report: published }
                }
                Err(e) => {
                    obs::emit_distribution_failed(&ctx.run_id, &e);
                    report.distribution = DistributionOutcome::Failed {
                        reason: e.to_string(),
                    };
                }
            }
        }

        report.summary = BuildSummary::from_rows(
            report
                .plan
                .tasks
                .iter()
                .filter_map(|task| {
                    let done = report
                        .services
                        .iter()
                        .find(|s| s.built.service.id == task.service.id)?;
                    Some(SummaryRow {
                        service: task.service.id.clone(),
                        before: task.current,
                        after: task.target,
                        size_before: done.size_before,
                        size_after: Some(done.built.artifact.size_bytes),
                    })
                })
                .collect(),
        );

        obs::emit_build_finished(
            &ctx.run_id,
            ctx.elapsed_ms(),
            report.services.len(),
            matches!(report.distribution, DistributionOutcome::Published { .. }),
        );
        Ok(report)
    }

    /// Pipeline, install and git for one task. `Ok(None)` when the pipeline
    /// skipped the service.
    async fn build_one(
        &self,
        ctx: &RunContext,
        task: &BuildTask,
        release_type: fleet_state::ReleaseType,
        warnings: &mut Vec<String>,
    ) -> Result<Option<ServiceReport>> {
        ctx.check_cancelled()?;
        let service = &task.service;
        let version = self.stamp(task).await;
        let size_before = BuildArtifact::measure(&service.artifact_path(self.resolver.bin_dir()))
            .map(|a| a.size_bytes);
        info!(service = %service.id, from = %task.current, to = %version, "building");

        let outcome = self.pipeline.run(task, &version, &ctx.cancel).await?;
        for stage in &outcome.stages {
            let status = match &stage.status {
                StageStatus::Passed => "passed".to_string(),
                StageStatus::ToolMissing { program } => format!("tool missing: {program}"),
                StageStatus::Skipped { reason } => format!("skipped: {reason}"),
            };
            obs::emit_stage_finished(&service.id, &stage.stage, stage.duration_ms, &status);
        }
        warnings.extend(
            outcome
                .warnings
                .iter()
                .map(|w| format!("{}: {w}", service.id)),
        );
        if !outcome.built {
            warn!(service = %service.id, "pipeline skipped service");
            return Ok(None);
        }
        let artifact = outcome.artifact.ok_or_else(|| FleetError::Pipeline {
            service: service.id.clone(),
            stage: "compile".to_string(),
            output: "build produced no artifact".to_string(),
        })?;

        ctx.check_cancelled()?;
        let installed = matches!(
            self.installer.install(service, &artifact).await?,
            InstallOutcome::Installed { .. }
        );

        ctx.check_cancelled()?;
        let git = self.git.publish(service, release_type, &version).await?;

        obs::emit_service_built(&service.id, &version.to_string(), artifact.size_bytes);
        Ok(Some(ServiceReport {
            built: BuiltService {
                service: service.clone(),
                version,
                artifact,
            },
            installed,
            git,
            size_before,
        }))
    }

    async fn stamp(&self, task: &BuildTask) -> Version {
        let dir = task.service.source.as_path();
        let runner = self.runner.as_ref();
        let branch = git::current_branch(runner, dir)
            .await
            .unwrap_or_else(|| "main".to_string());
        let commit = git::short_head_sha(runner, dir)
            .await
            .unwrap_or_else(|| "unknown".to_string());
        Version::stamp(task.target, &branch, &commit, Utc::now(), &self.arch)
    }

    async fn report_failure(&self, task: &BuildTask, error: &FleetError) {
        obs::emit_service_failed(&task.service.id, error);
        if matches!(error, FleetError::Cancelled) {
            return;
        }
        let notification = Notification::critical(
            format!("fleet build failed: {}", task.service.id),
            error.to_string(),
        );
        if let Err(e) = self.notifier.notify(&notification).await {
            warn!(error = %e, "failure notification not delivered");
        }
    }
}
