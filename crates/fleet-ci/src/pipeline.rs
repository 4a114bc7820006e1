//! Per-service build pipeline: stop, tidy → format → lint → test → compile.
//! Binaries are written to the configured bin directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use fleet_core::pipeline::{BuildArtifact, PipelineOutcome, PipelineRunner};
use fleet_core::{systemctl, BuildTask, FleetError, Result, ServiceDefinition, Toolchain, Version};
use fleet_exec::CommandRunner;

use crate::runner::StageRunner;
use crate::stage::{stages_for, BuiltinStage};

/// [`PipelineRunner`] that shells out to the service's toolchain.
pub struct BuildPipelineRunner {
    runner: Arc<dyn CommandRunner>,
    systemd_user: bool,
    bin_dir: PathBuf,
}

impl BuildPipelineRunner {
    /// Compiled binaries land in `bin_dir`, never inside a checkout.
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        systemd_user: bool,
        bin_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            systemd_user,
            bin_dir: bin_dir.into(),
        }
    }

    /// Stop the running instance so the binary can be replaced.
    async fn stop_service(&self, service: &ServiceDefinition) {
        if !service.managed() {
            return;
        }
        let spec = systemctl(self.systemd_user).args(["stop", service.id.as_str()]);
        match self.runner.run(&spec).await {
            Ok(out) if !out.success() => {
                debug!(service = %service.id, stderr = %out.stderr.trim(), "stop failed; continuing")
            }
            Err(e) => debug!(service = %service.id, error = %e, "stop failed; continuing"),
            Ok(_) => {}
        }
    }
}

fn compile_err(service: &ServiceDefinition, output: String) -> FleetError {
    FleetError::Pipeline {
        service: service.id.clone(),
        stage: BuiltinStage::Compile.name().to_string(),
        output,
    }
}

/// Copy `target/release/<bin>` into the bin directory, where everything else
/// expects the artifact.
fn copy_cargo_binary(service: &ServiceDefinition, bin_dir: &Path) -> Result<()> {
    let built = service
        .source
        .join("target/release")
        .join(service.binary_name());
    let dest = service.artifact_path(bin_dir);
    std::fs::copy(&built, &dest)
        .map(|_| ())
        .map_err(|e| compile_err(service, format!("copying {}: {e}", built.display())))
}

#[async_trait]
impl PipelineRunner for BuildPipelineRunner {
    async fn run(
        &self,
        task: &BuildTask,
        version: &Version,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome> {
        let service = &task.service;
        if !service.source.is_dir() {
            return Ok(PipelineOutcome::skipped(format!(
                "source {} missing; skipped",
                service.source.display()
            )));
        }

        let start = Instant::now();
        self.stop_service(service).await;
        std::fs::create_dir_all(&self.bin_dir).map_err(|e| {
            compile_err(service, format!("creating {}: {e}", self.bin_dir.display()))
        })?;

        let stage_runner = StageRunner::new(self.runner.as_ref(), cancel);
        let mut outcome = PipelineOutcome {
            built: true,
            artifact: None,
            stages: Vec::new(),
            warnings: Vec::new(),
        };

        for config in stages_for(service, version, &self.bin_dir) {
            let result = stage_runner.execute_stage(&service.id, &config).await?;
            outcome.warnings.extend(result.warnings);
            outcome.stages.push(result.report);

            if config.stage == BuiltinStage::Compile && service.toolchain() == Toolchain::Cargo {
                copy_cargo_binary(service, &self.bin_dir)?;
            }
        }

        let path = service.artifact_path(&self.bin_dir);
        let artifact = BuildArtifact::measure(&path)
            .ok_or_else(|| compile_err(service, format!("no artifact at {}", path.display())))?;
        info!(
            service = %service.id,
            size_bytes = artifact.size_bytes,
            duration_ms = start.elapsed().as_millis() as u64,
            "pipeline passed"
        );
        outcome.artifact = Some(artifact);
        Ok(outcome)
    }
}
