//! Structured observability hooks for build lifecycle events.
//!
//! This module provides:
//! - Run-scoped tracing spans via the `BuildSpan` RAII guard
//! - Emission functions for key lifecycle events: start, stage, service built,
//!   distribution failure, finish
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`). Pass
//! `--json` on the command line for JSON output.

use tracing::info;

/// RAII guard that enters a run-scoped tracing span for the duration of a
/// build.
///
/// # Example
///
/// ```ignore
/// let _span = BuildSpan::enter("0b6f…");
/// // every event below carries run_id
/// ```
pub struct BuildSpan {
    _span: tracing::span::EnteredSpan,
}

impl BuildSpan {
    /// Create and enter a span tagged with the run id.
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("fleet.build", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: build started with its plan size.
pub fn emit_build_started(run_id: &str, increment: &str, tasks: usize) {
    info!(event = "build.started", run_id = %run_id, increment = %increment, tasks = tasks);
}

/// Emit event: one pipeline stage finished.
pub fn emit_stage_finished(service: &str, stage: &str, duration_ms: u64, status: &str) {
    info!(
        event = "build.stage_finished",
        service = %service,
        stage = %stage,
        duration_ms = duration_ms,
        status = %status,
    );
}

/// Emit event: a service was built, installed and pushed.
pub fn emit_service_built(service: &str, version: &str, size_bytes: u64) {
    info!(
        event = "build.service_built",
        service = %service,
        version = %version,
        size_bytes = size_bytes,
    );
}

/// Emit event: a service build failed (error level).
pub fn emit_service_failed(service: &str, error: &dyn std::fmt::Display) {
    tracing::error!(event = "build.service_failed", service = %service, error = %error);
}

/// Emit event: distribution failed after local success (warning level).
pub fn emit_distribution_failed(run_id: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "build.distribution_failed", run_id = %run_id, error = %error);
}

/// Emit event: build finished.
pub fn emit_build_finished(run_id: &str, duration_ms: u64, built: usize, distributed: bool) {
    info!(
        event = "build.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        built = built,
        distributed = distributed,
    );
}
