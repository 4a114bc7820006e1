//! In-memory fakes for the execution traits (testing only)
//!
//! `RecordingRunner` answers commands from a script of rules and records
//! every invocation so tests can assert exact sequences and arguments.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::MessageGenerator;
use crate::notify::{Notification, Notifier};
use crate::runner::{CommandOutput, CommandRunner, CommandSpec};
use crate::{ExecError, Result};

// ---------------------------------------------------------------------------
// RecordingRunner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Response {
    Output(CommandOutput),
    Missing,
}

#[derive(Debug, Clone)]
struct Rule {
    prefix: String,
    /// Only match commands run in this directory.
    cwd: Option<PathBuf>,
    response: Response,
}

impl Rule {
    fn matches(&self, spec: &CommandSpec, line: &str) -> bool {
        line.starts_with(&self.prefix)
            && self
                .cwd
                .as_deref()
                .map_or(true, |dir| spec.cwd.as_deref() == Some(dir))
    }
}

/// Scripted command runner.
///
/// A rule matches when the command line (`program arg1 arg2 ...`) starts with
/// its prefix, and for rules added with [`RecordingRunner::respond_in`], when
/// the command runs in the given directory. Rules added later take
/// precedence. Unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with `output`.
    pub fn respond(&self, prefix: &str, output: CommandOutput) -> &Self {
        self.push(prefix, None, Response::Output(output))
    }

    /// Like [`RecordingRunner::respond`], limited to commands run in `dir`.
    pub fn respond_in(&self, dir: &Path, prefix: &str, output: CommandOutput) -> &Self {
        self.push(prefix, Some(dir.to_path_buf()), Response::Output(output))
    }

    fn push(&self, prefix: &str, cwd: Option<PathBuf>, response: Response) -> &Self {
        self.rules.lock().unwrap().push(Rule {
            prefix: prefix.to_string(),
            cwd,
            response,
        });
        self
    }

    /// Shorthand for a successful answer with the given stdout.
    pub fn stdout(&self, prefix: &str, stdout: &str) -> &Self {
        self.respond(prefix, CommandOutput::ok(stdout))
    }

    /// Shorthand for a failing answer.
    pub fn fail(&self, prefix: &str, exit_code: i32, stderr: &str) -> &Self {
        self.respond(prefix, CommandOutput::failed(exit_code, stderr))
    }

    /// Pretend the program for matching commands is not installed.
    pub fn missing(&self, prefix: &str) -> &Self {
        self.push(prefix, None, Response::Missing)
    }

    /// Every command run so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Command lines of every call, in order.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::command_line).collect()
    }

    /// Command lines starting with `prefix`.
    pub fn lines_starting_with(&self, prefix: &str) -> Vec<String> {
        self.command_lines()
            .into_iter()
            .filter(|l| l.starts_with(prefix))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        let line = spec.command_line();
        let rules = self.rules.lock().unwrap();
        let response = rules
            .iter()
            .rev()
            .find(|r| r.matches(spec, &line))
            .map(|r| r.response.clone());
        match response {
            Some(Response::Output(out)) => Ok(out),
            Some(Response::Missing) => Err(ExecError::ToolNotFound {
                program: spec.program.clone(),
            }),
            None => Ok(CommandOutput::ok("")),
        }
    }
}

// ---------------------------------------------------------------------------
// StaticMessageGenerator
// ---------------------------------------------------------------------------

/// Message generator returning a fixed reply, or failing when built with
/// [`StaticMessageGenerator::unavailable`].
#[derive(Debug, Default)]
pub struct StaticMessageGenerator {
    reply: Option<String>,
    requests: Mutex<Vec<String>>,
}

impl StaticMessageGenerator {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Service ids a message was requested for.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageGenerator for StaticMessageGenerator {
    async fn commit_message(&self, service: &str, _diff: &str) -> Result<String> {
        self.requests.lock().unwrap().push(service.to_string());
        self.reply
            .clone()
            .ok_or_else(|| ExecError::Http("model unavailable".to_string()))
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Notifier that keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_later_rules_take_precedence() {
        let runner = RecordingRunner::new();
        runner
            .stdout("git", "generic")
            .stdout("git describe", "1.2.3\n");

        let describe = CommandSpec::new("git").args(["describe", "--tags", "--abbrev=0"]);
        let status = CommandSpec::new("git").args(["status", "--porcelain"]);
        assert_eq!(runner.run(&describe).await.unwrap().stdout, "1.2.3\n");
        assert_eq!(runner.run(&status).await.unwrap().stdout, "generic");
        assert_eq!(
            runner.command_lines(),
            vec!["git describe --tags --abbrev=0", "git status --porcelain"]
        );
    }

    #[tokio::test]
    async fn test_directory_scoped_rules() {
        let runner = RecordingRunner::new();
        runner.respond_in(
            Path::new("/src/api"),
            "git status",
            CommandOutput::ok(" M main.go\n"),
        );
        let api = CommandSpec::new("git").arg("status").current_dir("/src/api");
        let web = CommandSpec::new("git").arg("status").current_dir("/src/web");
        assert_eq!(runner.run(&api).await.unwrap().stdout, " M main.go\n");
        assert_eq!(runner.run(&web).await.unwrap().stdout, "");
    }

    #[tokio::test]
    async fn test_missing_and_unmatched() {
        let runner = RecordingRunner::new();
        runner.missing("golangci-lint");
        let err = runner
            .run(&CommandSpec::new("golangci-lint").args(["run", "./..."]))
            .await
            .unwrap_err();
        assert!(err.is_tool_missing());

        let out = runner.run(&CommandSpec::new("go").arg("build")).await.unwrap();
        assert!(out.success());
        assert_eq!(runner.lines_starting_with("go ").len(), 1);
    }

    #[tokio::test]
    async fn test_static_generator() {
        let ok = StaticMessageGenerator::new("feat: add retries");
        assert_eq!(
            ok.commit_message("api", "diff").await.unwrap(),
            "feat: add retries"
        );
        assert_eq!(ok.requests(), vec!["api"]);
        assert!(StaticMessageGenerator::unavailable()
            .commit_message("api", "diff")
            .await
            .is_err());
    }
}
