//! Git queries used while planning and publishing.
//!
//! All calls go through a [`CommandRunner`] so tests can script them.

use std::path::Path;

use fleet_exec::{CommandOutput, CommandRunner, CommandSpec};

use crate::domain::error::{FleetError, Result};

/// `git <args>` in `dir`.
pub fn git(dir: &Path, args: &[&str]) -> CommandSpec {
    CommandSpec::new("git").args(args.iter().copied()).current_dir(dir)
}

/// Run `git <args>` and fail with [`FleetError::Git`] on a non-zero exit.
pub async fn run_git(
    runner: &dyn CommandRunner,
    service: &str,
    dir: &Path,
    args: &[&str],
) -> Result<CommandOutput> {
    let out = runner.run(&git(dir, args)).await?;
    if !out.success() {
        return Err(FleetError::Git {
            service: service.to_string(),
            output: format!("git {}: {}", args.join(" "), out.combined()),
        });
    }
    Ok(out)
}

/// Capture the HEAD commit SHA.
pub async fn capture_head_sha(runner: &dyn CommandRunner, dir: &Path) -> Result<String> {
    let out = run_git(runner, &dir.display().to_string(), dir, &["rev-parse", "HEAD"]).await?;
    let sha = out.stdout.trim().to_string();
    if sha.is_empty() {
        return Err(FleetError::Git {
            service: dir.display().to_string(),
            output: "git rev-parse HEAD returned empty output".to_string(),
        });
    }
    Ok(sha)
}

/// Abbreviated HEAD SHA, if the directory is a repository with commits.
pub async fn short_head_sha(runner: &dyn CommandRunner, dir: &Path) -> Option<String> {
    let out = runner
        .run(&git(dir, &["rev-parse", "--short", "HEAD"]))
        .await
        .ok()?;
    let sha = out.stdout.trim();
    (out.success() && !sha.is_empty()).then(|| sha.to_string())
}

/// Checked-out branch name.
pub async fn current_branch(runner: &dyn CommandRunner, dir: &Path) -> Option<String> {
    let out = runner
        .run(&git(dir, &["rev-parse", "--abbrev-ref", "HEAD"]))
        .await
        .ok()?;
    let branch = out.stdout.trim();
    (out.success() && !branch.is_empty() && branch != "HEAD").then(|| branch.to_string())
}

/// Check whether a directory is inside a git work tree.
pub async fn is_git_repo(runner: &dyn CommandRunner, dir: &Path) -> bool {
    runner
        .run(&git(dir, &["rev-parse", "--is-inside-work-tree"]))
        .await
        .map(|o| o.success())
        .unwrap_or(false)
}

/// `-- .` plus an `:(exclude)` entry for a path relative to the work tree.
pub fn pathspec_excluding(exclude: Option<&Path>) -> Vec<String> {
    let mut spec = vec!["--".to_string(), ".".to_string()];
    if let Some(rel) = exclude {
        spec.push(format!(":(exclude){}", rel.display()));
    }
    spec
}

/// Uncommitted changes, tracked or untracked, outside `exclude`.
pub async fn has_uncommitted_changes(
    runner: &dyn CommandRunner,
    dir: &Path,
    exclude: Option<&Path>,
) -> Result<bool> {
    let spec = pathspec_excluding(exclude);
    let mut args = vec!["status", "--porcelain"];
    args.extend(spec.iter().map(String::as_str));
    let out = run_git(runner, &dir.display().to_string(), dir, &args).await?;
    Ok(!out.stdout.trim().is_empty())
}

/// Most recent tag reachable from HEAD; `None` when there are no tags.
pub async fn latest_tag(runner: &dyn CommandRunner, dir: &Path) -> Option<String> {
    let out = runner
        .run(&git(dir, &["describe", "--tags", "--abbrev=0"]))
        .await
        .ok()?;
    let tag = out.stdout.trim();
    (out.success() && !tag.is_empty()).then(|| tag.to_string())
}

/// Commit a tag points at, or `None` if the tag does not exist.
pub async fn tag_target(runner: &dyn CommandRunner, dir: &Path, tag: &str) -> Option<String> {
    let rev = format!("refs/tags/{tag}^{{commit}}");
    let out = runner
        .run(&git(dir, &["rev-parse", "-q", "--verify", &rev]))
        .await
        .ok()?;
    let sha = out.stdout.trim();
    (out.success() && !sha.is_empty()).then(|| sha.to_string())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::process::Command as StdCommand;

    pub fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    pub fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init", "-q", "-b", "main"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["config", "tag.gpgSign", "false"]);
        run_git(dir.path(), &["config", "commit.gpgSign", "false"]);
        run_git(dir.path(), &["commit", "-q", "--allow-empty", "-m", "initial"]);
        dir
    }
}
