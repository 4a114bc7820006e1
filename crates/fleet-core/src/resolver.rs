//! Current-version resolution.
//!
//! Three sources can drift apart: the release manifest (not yet published),
//! git tags (not yet pushed) and the installed binary (stale). The resolver
//! trusts whichever is highest so a build never downgrades a service.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fleet_exec::{CommandRunner, CommandSpec};
use fleet_state::{ManifestStore, ReleaseManifest};
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::service::ServiceDefinition;
use crate::domain::version::{Version, VersionCore};
use crate::git;

const VERSION_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Every candidate found for one service, and the winner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedVersion {
    pub manifest: Option<VersionCore>,
    pub tag: Option<VersionCore>,
    pub binary: Option<VersionCore>,
    pub resolved: VersionCore,
}

/// Highest of `candidates`, `0.0.0` when there are none.
pub fn pick_highest<I>(candidates: I) -> VersionCore
where
    I: IntoIterator<Item = VersionCore>,
{
    candidates.into_iter().max().unwrap_or(VersionCore::ZERO)
}

/// Parse a version as found in a tag or `--version` output.
fn parse_lenient(raw: &str) -> Option<VersionCore> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(trimmed).ok().map(|p| p.version().core())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

pub struct VersionResolver {
    runner: Arc<dyn CommandRunner>,
    manifest: Arc<dyn ManifestStore>,
    bin_dir: PathBuf,
}

impl VersionResolver {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        manifest: Arc<dyn ManifestStore>,
        bin_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            manifest,
            bin_dir: bin_dir.into(),
        }
    }

    /// Where compiled binaries are looked up.
    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    /// Load the manifest, treating an unreadable one as empty.
    pub async fn load_manifest(&self) -> ReleaseManifest {
        match self.manifest.load().await {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "release manifest unreadable; ignoring it as a version source");
                ReleaseManifest::new()
            }
        }
    }

    /// Current version of `service`.
    pub async fn resolve(&self, service: &ServiceDefinition) -> VersionCore {
        let manifest = self.load_manifest().await;
        self.candidates(&manifest, service).await.resolved
    }

    /// Gather every candidate against an already loaded manifest.
    pub async fn candidates(
        &self,
        manifest: &ReleaseManifest,
        service: &ServiceDefinition,
    ) -> ResolvedVersion {
        let from_manifest = manifest
            .service_versions(&service.id)
            .into_iter()
            .filter_map(parse_lenient)
            .max();
        let from_tag = self.tag_candidate(&service.source).await;
        let from_binary = self.binary_candidate(&service.artifact_path(&self.bin_dir)).await;

        let resolved = pick_highest(from_manifest.into_iter().chain(from_tag).chain(from_binary));
        debug!(
            service = %service.id,
            manifest = ?from_manifest,
            tag = ?from_tag,
            binary = ?from_binary,
            resolved = %resolved,
            "version resolved"
        );
        ResolvedVersion {
            manifest: from_manifest,
            tag: from_tag,
            binary: from_binary,
            resolved,
        }
    }

    /// No tags at all is `0.0.0`; an unparseable tag is no candidate.
    async fn tag_candidate(&self, source: &Path) -> Option<VersionCore> {
        if !source.is_dir() {
            return None;
        }
        match git::latest_tag(self.runner.as_ref(), source).await {
            Some(tag) => parse_lenient(&tag),
            None => Some(VersionCore::ZERO),
        }
    }

    /// Last whitespace-separated token of `<binary> --version`.
    async fn binary_candidate(&self, binary: &Path) -> Option<VersionCore> {
        if !is_executable(binary) {
            return None;
        }
        let spec = CommandSpec::new(binary.display().to_string())
            .arg("--version")
            .timeout(VERSION_QUERY_TIMEOUT);
        let out = self.runner.run(&spec).await.ok()?;
        if !out.success() {
            return None;
        }
        out.stdout.split_whitespace().last().and_then(parse_lenient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::service::{test_service, Category};
    use fleet_exec::fakes::RecordingRunner;
    use fleet_exec::CommandOutput;
    use fleet_state::fakes::MemoryManifestStore;
    use fleet_state::{ReleaseEntry, ReleaseType, ServiceRelease};

    const NO_BINARIES: &str = "/nonexistent/fleet/bin";

    fn manifest_with(service: &str, versions: &[&str]) -> ReleaseManifest {
        let mut m = ReleaseManifest::new();
        for (i, v) in versions.iter().enumerate() {
            let mut entry = ReleaseEntry::new(ReleaseType::Patch, "abc");
            entry.services.insert(
                service.to_string(),
                ServiceRelease {
                    version: v.to_string(),
                    ..Default::default()
                },
            );
            m.releases.insert(format!("0.0.{i}"), entry);
        }
        m
    }

    #[cfg(unix)]
    fn install_fake_binary(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::write(path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_pick_highest() {
        assert_eq!(pick_highest(Vec::new()), VersionCore::ZERO);
        assert_eq!(
            pick_highest([VersionCore::new(1, 2, 3), VersionCore::new(1, 10, 0)]),
            VersionCore::new(1, 10, 0)
        );
    }

    #[test]
    fn test_pick_highest_is_monotonic() {
        let base = [
            VersionCore::new(0, 4, 1),
            VersionCore::new(1, 2, 3),
            VersionCore::new(1, 2, 0),
        ];
        let before = pick_highest(base);
        for extra in [
            VersionCore::new(0, 0, 1),
            VersionCore::new(1, 2, 3),
            VersionCore::new(1, 2, 4),
            VersionCore::new(9, 0, 0),
        ] {
            let after = pick_highest(base.iter().copied().chain([extra]));
            assert!(after >= before, "adding {extra} lowered {before} to {after}");
            assert!(after >= extra);
        }
    }

    #[test]
    fn test_parse_lenient() {
        assert_eq!(parse_lenient("v1.2.3\n"), Some(VersionCore::new(1, 2, 3)));
        assert_eq!(
            parse_lenient("1.2.3.main.abc.20260101000000.amd64.deadbeef"),
            Some(VersionCore::new(1, 2, 3))
        );
        assert_eq!(parse_lenient("release-candidate"), None);
    }

    #[tokio::test]
    async fn test_resolve_takes_highest_of_all_sources() {
        let src = tempfile::tempdir().unwrap();
        let svc = test_service("gateway", Category::Core, src.path());
        let runner = Arc::new(RecordingRunner::new());
        runner.stdout("git describe", "v1.4.0\n");
        let store = Arc::new(MemoryManifestStore::with_manifest(manifest_with(
            "gateway",
            &["1.2.3.main.abc.20260101000000.amd64.deadbeef", "not-a-version"],
        )));

        let resolver = VersionResolver::new(runner.clone(), store, NO_BINARIES);
        let got = resolver
            .candidates(&resolver.load_manifest().await, &svc)
            .await;
        assert_eq!(got.manifest, Some(VersionCore::new(1, 2, 3)));
        assert_eq!(got.tag, Some(VersionCore::new(1, 4, 0)));
        assert_eq!(got.binary, None, "no binary installed");
        assert_eq!(got.resolved, VersionCore::new(1, 4, 0));
    }

    #[tokio::test]
    async fn test_no_tags_is_zero_not_error() {
        let src = tempfile::tempdir().unwrap();
        let svc = test_service("api", Category::Backend, src.path());
        let runner = Arc::new(RecordingRunner::new());
        runner.fail("git describe", 128, "fatal: No names found");
        let resolver =
            VersionResolver::new(runner, Arc::new(MemoryManifestStore::new()), NO_BINARIES);

        let got = resolver.candidates(&ReleaseManifest::new(), &svc).await;
        assert_eq!(got.tag, Some(VersionCore::ZERO));
        assert_eq!(resolver.resolve(&svc).await, VersionCore::ZERO);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_installed_binary_candidate() {
        let src = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        let svc = test_service("api", Category::Backend, src.path());
        let binary = svc.artifact_path(bin.path());
        install_fake_binary(&binary);

        let runner = Arc::new(RecordingRunner::new());
        runner.stdout("git describe", "1.0.0\n");
        runner.respond(
            &format!("{} --version", binary.display()),
            CommandOutput::ok("api version 2.1.7.main.abc.20260101000000.amd64.deadbeef\n"),
        );
        let resolver = VersionResolver::new(
            runner.clone(),
            Arc::new(MemoryManifestStore::new()),
            bin.path(),
        );

        let got = resolver.candidates(&ReleaseManifest::new(), &svc).await;
        assert_eq!(got.binary, Some(VersionCore::new(2, 1, 7)));
        assert_eq!(got.resolved, VersionCore::new(2, 1, 7));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_broken_binary_output_is_dropped() {
        let src = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        let svc = test_service("api", Category::Backend, src.path());
        let binary = svc.artifact_path(bin.path());
        install_fake_binary(&binary);

        let runner = Arc::new(RecordingRunner::new());
        runner.stdout("git describe", "0.3.1\n");
        runner.respond(&binary.display().to_string(), CommandOutput::ok("dev build\n"));
        let resolver =
            VersionResolver::new(runner, Arc::new(MemoryManifestStore::new()), bin.path());
        let got = resolver.candidates(&ReleaseManifest::new(), &svc).await;
        assert_eq!(got.binary, None);
        assert_eq!(got.resolved, VersionCore::new(0, 3, 1));
    }

    #[tokio::test]
    async fn test_missing_source_has_no_tag_candidate() {
        let svc = test_service("ghost", Category::Backend, "/nonexistent/fleet/ghost");
        let runner = Arc::new(RecordingRunner::new());
        let resolver = VersionResolver::new(
            runner.clone(),
            Arc::new(MemoryManifestStore::new()),
            NO_BINARIES,
        );
        let got = resolver.candidates(&ReleaseManifest::new(), &svc).await;
        assert_eq!(got, ResolvedVersion::default());
        assert!(runner.calls().is_empty());
    }
}
