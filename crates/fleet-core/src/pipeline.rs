//! Build pipeline seam.
//!
//! The orchestrator drives one [`PipelineRunner`] per run; `fleet-ci`
//! provides the real one.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::domain::error::Result;
use crate::domain::task::BuildTask;
use crate::domain::version::Version;

/// Outcome of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    Passed,
    /// Tool not installed; the stage was skipped with a warning.
    ToolMissing { program: String },
    /// Not applicable, e.g. no test configuration.
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: String,
    pub status: StageStatus,
    pub duration_ms: u64,
}

/// What a successful build left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Frontend bundles are directories.
    pub is_directory: bool,
}

impl BuildArtifact {
    /// Measure whatever is at `path`; `None` when nothing is there.
    pub fn measure(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        if meta.is_dir() {
            Some(BuildArtifact {
                path: path.to_path_buf(),
                size_bytes: dir_size(path),
                is_directory: true,
            })
        } else {
            Some(BuildArtifact {
                path: path.to_path_buf(),
                size_bytes: meta.len(),
                is_directory: false,
            })
        }
    }
}

/// Total size of regular files under `dir`. Symlinks are not followed.
pub fn dir_size(dir: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| match entry.file_type() {
            Ok(ft) if ft.is_dir() => dir_size(&entry.path()),
            Ok(ft) if ft.is_file() => entry.metadata().map(|m| m.len()).unwrap_or(0),
            _ => 0,
        })
        .sum()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineOutcome {
    /// `false` when the service was skipped (source vanished since planning).
    pub built: bool,
    pub artifact: Option<BuildArtifact>,
    pub stages: Vec<StageReport>,
    pub warnings: Vec<String>,
}

impl PipelineOutcome {
    pub fn skipped(warning: impl Into<String>) -> Self {
        PipelineOutcome {
            built: false,
            artifact: None,
            stages: Vec::new(),
            warnings: vec![warning.into()],
        }
    }
}

/// Runs tidy → format → lint → test → compile for one service.
///
/// Any stage failure is an `Err`; the caller aborts the whole run.
#[async_trait]
pub trait PipelineRunner: Send + Sync {
    async fn run(
        &self,
        task: &BuildTask,
        version: &Version,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome>;
}
