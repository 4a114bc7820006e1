//! Per-service commit, tag and push.
//!
//! Every build that changes a service is committed and tagged with its short
//! version, so tag history is a complete version ledger for the service.
//! Build output is never staged, even when it lands inside the checkout.

use std::path::PathBuf;
use std::sync::Arc;

use fleet_exec::{CommandRunner, MessageGenerator};
use fleet_state::ReleaseType;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::error::{FleetError, Result};
use crate::domain::service::ServiceDefinition;
use crate::domain::version::Version;
use crate::git::{self, run_git};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TagStatus {
    Created,
    /// The tag already pointed at the release commit.
    AlreadyAtHead,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GitOutcome {
    /// Nothing staged; no commit, tag or push.
    Clean,
    Published {
        commit: String,
        tag: String,
        tag_status: TagStatus,
        /// Whether the message came from the model.
        generated_message: bool,
    },
}

/// Generic commit message used whenever the model is unavailable.
pub fn fallback_message(service: &str, release_type: ReleaseType, short: &str) -> String {
    format!("chore({service}): {release_type} release {short}")
}

pub struct GitPublisher {
    runner: Arc<dyn CommandRunner>,
    messages: Arc<dyn MessageGenerator>,
    bin_dir: PathBuf,
}

impl GitPublisher {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        messages: Arc<dyn MessageGenerator>,
        bin_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            messages,
            bin_dir: bin_dir.into(),
        }
    }

    pub async fn publish(
        &self,
        service: &ServiceDefinition,
        release_type: ReleaseType,
        version: &Version,
    ) -> Result<GitOutcome> {
        let runner = self.runner.as_ref();
        let id = service.id.as_str();
        let dir = service.source.as_path();
        let short = version.short();

        let spec = git::pathspec_excluding(service.checkout_artifact(&self.bin_dir).as_deref());
        let mut add = vec!["add", "-A"];
        add.extend(spec.iter().map(String::as_str));
        run_git(runner, id, dir, &add).await?;
        let diff = run_git(runner, id, dir, &["diff", "--cached"]).await?;
        if diff.stdout.trim().is_empty() {
            warn!(service = %id, "nothing to commit");
            return Ok(GitOutcome::Clean);
        }

        let (message, generated_message) =
            match self.messages.commit_message(id, &diff.stdout).await {
                Ok(m) if !m.trim().is_empty() => (m, true),
                Ok(_) => (fallback_message(id, release_type, &short), false),
                Err(e) => {
                    debug!(service = %id, error = %e, "commit message generation failed");
                    (fallback_message(id, release_type, &short), false)
                }
            };

        run_git(runner, id, dir, &["commit", "-m", &message]).await?;
        run_git(runner, id, dir, &["push"]).await?;
        let head = git::capture_head_sha(runner, dir).await.map_err(|e| FleetError::Git {
            service: id.to_string(),
            output: e.to_string(),
        })?;

        let tag_status = match git::tag_target(runner, dir, &short).await {
            Some(existing) if existing == head => {
                warn!(service = %id, tag = %short, "tag already exists at HEAD");
                TagStatus::AlreadyAtHead
            }
            Some(existing) => {
                return Err(FleetError::TagConflict {
                    service: id.to_string(),
                    tag: short,
                    existing,
                    head,
                });
            }
            None => {
                let tag_message = format!("{release_type} release {version}");
                run_git(runner, id, dir, &["tag", "-a", &short, "-m", &tag_message]).await?;
                TagStatus::Created
            }
        };
        run_git(runner, id, dir, &["push", "--tags"]).await?;

        info!(service = %id, tag = %short, commit = %head, "source published");
        Ok(GitOutcome::Published {
            commit: head,
            tag: short,
            tag_status,
            generated_message,
        })
    }
}
