//! Distribution repository publishing.
//!
//! Copies built binaries into `releases/<short>/<platform>/`, records them in
//! the release manifest and pushes the distribution repository. A minor
//! release also drops every other minor of the same major: the manifest
//! entries in the same save as the new release, the directories right after.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fleet_exec::{CommandOutput, CommandRunner};
use fleet_state::{ManifestStore, ReleaseType, ServiceRelease};
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::error::{FleetError, Result};
use crate::domain::service::ServiceDefinition;
use crate::domain::version::Version;
use crate::git;
use crate::pipeline::BuildArtifact;

/// A service that made it through build, install and git.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuiltService {
    pub service: ServiceDefinition,
    pub version: Version,
    pub artifact: BuildArtifact,
}

/// The build whose version the `latest` pointers take: the CLI entry point
/// when it was built, otherwise the first built service.
pub fn latest_source(built: &[BuiltService]) -> Option<&BuiltService> {
    built
        .iter()
        .find(|b| b.service.is_cli())
        .or_else(|| built.first())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub short_version: String,
    /// Superseded minor releases removed from the manifest.
    pub pruned: Vec<String>,
    /// Manifest-relative binary paths written.
    pub binaries: Vec<String>,
    /// Whether the distribution repository got a new commit.
    pub committed: bool,
}

pub struct ReleasePublisher {
    runner: Arc<dyn CommandRunner>,
    store: Arc<dyn ManifestStore>,
    dist_repo: PathBuf,
    platform: String,
}

const DIST: &str = "distribution";

fn publish_err(context: &str, e: impl std::fmt::Display) -> FleetError {
    FleetError::Publish(format!("{context}: {e}"))
}

impl ReleasePublisher {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        store: Arc<dyn ManifestStore>,
        dist_repo: impl Into<PathBuf>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            store,
            dist_repo: dist_repo.into(),
            platform: platform.into(),
        }
    }

    fn release_dir(&self, short: &str) -> PathBuf {
        self.dist_repo.join("releases").join(short)
    }

    /// Publish `built` under `short_version`. Errors are always
    /// [`FleetError::Publish`].
    pub async fn publish(
        &self,
        full_version: &Version,
        short_version: &str,
        release_type: ReleaseType,
        built: &[BuiltService],
    ) -> Result<PublishReport> {
        let mut manifest = self
            .store
            .load()
            .await
            .map_err(|e| publish_err("loading manifest", e))?;
        let mut report = PublishReport {
            short_version: short_version.to_string(),
            ..Default::default()
        };

        // Pruned directories go only once the manifest without them is saved.
        if release_type == ReleaseType::Minor {
            let stale = manifest.superseded_minors(full_version.major, full_version.minor);
            report.pruned = manifest.remove_releases(&stale);
        }

        let platform_dir = self.release_dir(short_version).join(&self.platform);
        std::fs::create_dir_all(&platform_dir)
            .map_err(|e| publish_err(&format!("creating {}", platform_dir.display()), e))?;

        let entry = manifest.upsert_release(short_version, release_type, &full_version.commit);
        for b in built {
            let mut record = ServiceRelease {
                version: b.version.to_string(),
                repository: b.service.repository.clone(),
                ..Default::default()
            };
            if b.artifact.is_directory {
                // Frontend bundles are served from their checkout.
                warn!(service = %b.service.id, "bundle recorded without a binary");
            } else {
                let name = b.service.binary_name();
                let dest = platform_dir.join(name);
                copy_binary(&b.artifact.path, &dest)
                    .map_err(|e| publish_err(&format!("copying {}", b.artifact.path.display()), e))?;
                let rel = format!("releases/{short_version}/{}/{name}", self.platform);
                record.binaries.insert(self.platform.clone(), rel.clone());
                report.binaries.push(rel);
            }
            entry.services.insert(b.service.id.clone(), record);
        }
        manifest.set_latest(&full_version.to_string());

        self.store
            .save(&manifest)
            .await
            .map_err(|e| publish_err("saving manifest", e))?;

        for key in &report.pruned {
            remove_dir_if_present(&self.release_dir(key))
                .map_err(|e| publish_err(&format!("removing release {key}"), e))?;
        }
        if !report.pruned.is_empty() {
            info!(pruned = ?report.pruned, "superseded minor releases removed");
        }

        report.committed = self.commit_and_push(short_version, release_type).await?;
        info!(
            version = %short_version,
            services = built.len(),
            committed = report.committed,
            "release published"
        );
        Ok(report)
    }

    async fn dist_git(&self, args: &[&str]) -> Result<CommandOutput> {
        git::run_git(self.runner.as_ref(), DIST, &self.dist_repo, args)
            .await
            .map_err(|e| FleetError::Publish(e.to_string()))
    }

    async fn commit_and_push(&self, short: &str, release_type: ReleaseType) -> Result<bool> {
        self.dist_git(&["add", "-A"]).await?;
        let status = self.dist_git(&["status", "--porcelain"]).await?;
        if status.stdout.trim().is_empty() {
            warn!("distribution repository unchanged; nothing to push");
            return Ok(false);
        }
        let message = format!("release {short} ({release_type})");
        self.dist_git(&["commit", "-m", &message]).await?;
        self.dist_git(&["push"]).await?;
        Ok(true)
    }
}

fn remove_dir_if_present(dir: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(dir) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Copy through a temp file in the target directory so a reader never sees
/// a half-written binary.
fn copy_binary(src: &Path, dest: &Path) -> std::io::Result<()> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    std::fs::copy(src, tmp.path())?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}
