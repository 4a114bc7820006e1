//! Stage execution.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use fleet_core::pipeline::{StageReport, StageStatus};
use fleet_core::{FleetError, Result};
use fleet_exec::{CommandOutput, CommandRunner, CommandSpec};

use crate::stage::StageConfig;

/// Result of a stage execution.
#[derive(Debug, Clone)]
pub struct StageResult {
    pub report: StageReport,

    /// Tools that were not installed; only outside the compile stage.
    pub warnings: Vec<String>,
}

impl StageResult {
    /// Whether every command actually ran and passed.
    pub fn passed(&self) -> bool {
        self.report.status == StageStatus::Passed
    }
}

/// Executes the commands of one stage through a [`CommandRunner`].
pub struct StageRunner<'a> {
    runner: &'a dyn CommandRunner,
    cancel: &'a CancellationToken,
}

impl<'a> StageRunner<'a> {
    pub fn new(runner: &'a dyn CommandRunner, cancel: &'a CancellationToken) -> Self {
        Self { runner, cancel }
    }

    /// Run every command in `config`, stopping at the first failure.
    ///
    /// A missing tool is a warning unless the stage requires its tools, in
    /// which case it is [`FleetError::ToolMissing`].
    pub async fn execute_stage(&self, service: &str, config: &StageConfig) -> Result<StageResult> {
        let start = Instant::now();

        if let Some(reason) = &config.skip_reason {
            debug!(service = %service, stage = config.name(), reason = %reason, "stage skipped");
            return Ok(StageResult {
                report: StageReport {
                    stage: config.name().to_string(),
                    status: StageStatus::Skipped {
                        reason: reason.clone(),
                    },
                    duration_ms: 0,
                },
                warnings: Vec::new(),
            });
        }

        if config.commands.is_empty() {
            return Err(FleetError::Pipeline {
                service: service.to_string(),
                stage: config.name().to_string(),
                output: "stage has no command".to_string(),
            });
        }

        let mut status = StageStatus::Passed;
        let mut warnings = Vec::new();

        for spec in &config.commands {
            debug!(service = %service, stage = config.name(), command = %spec, "running");
            match self.run_cancellable(spec).await? {
                Ok(out) if out.success() => {}
                Ok(out) => {
                    return Err(FleetError::Pipeline {
                        service: service.to_string(),
                        stage: config.name().to_string(),
                        output: format!("{spec}\n{}", out.combined()),
                    });
                }
                Err(e) if e.is_tool_missing() => {
                    if config.stage.requires_tools() {
                        return Err(FleetError::ToolMissing {
                            service: service.to_string(),
                            program: spec.program.clone(),
                        });
                    }
                    warn!(
                        service = %service,
                        stage = config.name(),
                        program = %spec.program,
                        "tool not installed; skipping"
                    );
                    warnings.push(format!("{} not installed; {} skipped", spec.program, spec));
                    status = StageStatus::ToolMissing {
                        program: spec.program.clone(),
                    };
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(StageResult {
            report: StageReport {
                stage: config.name().to_string(),
                status,
                duration_ms: start.elapsed().as_millis() as u64,
            },
            warnings,
        })
    }

    /// The outer `Result` is cancellation; the inner one is the command's.
    async fn run_cancellable(
        &self,
        spec: &CommandSpec,
    ) -> Result<fleet_exec::Result<CommandOutput>> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(FleetError::Cancelled),
            out = self.runner.run(spec) => Ok(out),
        }
    }
}
