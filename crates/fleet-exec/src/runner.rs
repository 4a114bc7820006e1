//! External command execution.
//!
//! [`SystemRunner`] spawns real processes through `tokio::process`; the
//! orchestrator only ever sees the [`CommandRunner`] trait.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{ExecError, Result};

/// A fully described command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// `None` means wait for as long as the process runs.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            timeout: None,
        }
    }

    /// Build from a whitespace-free argv, e.g. `["go", "test", "./..."]`.
    pub fn from_argv<S: AsRef<str>>(argv: &[S]) -> Result<Self> {
        let (program, rest) = argv.split_first().ok_or(ExecError::EmptyCommand)?;
        Ok(Self::new(program.as_ref()).args(rest.iter().map(|a| a.as_ref().to_string())))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Program and arguments joined by single spaces.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; -1 when the process was killed by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr, trimmed. Used in error reports.
    pub fn combined(&self) -> String {
        let out = self.stdout.trim();
        let err = self.stderr.trim();
        match (out.is_empty(), err.is_empty()) {
            (true, true) => String::new(),
            (false, true) => out.to_string(),
            (true, false) => err.to_string(),
            (false, false) => format!("{out}\n{err}"),
        }
    }
}

/// Capability to run external programs.
///
/// A non-zero exit is *not* an error at this level; callers inspect
/// [`CommandOutput::success`]. Errors are reserved for "could not run at all".
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Runs commands on the host.
///
/// Children are spawned with `kill_on_drop`, so dropping the returned future
/// (for example when a cancellation branch of a `select!` wins) kills the
/// process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let start = Instant::now();
        debug!(command = %spec, cwd = ?spec.cwd, "running command");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExecError::ToolNotFound {
                    program: spec.program.clone(),
                }
            } else {
                ExecError::Spawn {
                    program: spec.program.clone(),
                    source: e,
                }
            }
        })?;

        let output = match spec.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    warn!(command = %spec, secs = limit.as_secs(), "command timed out");
                    ExecError::Timeout {
                        command: spec.command_line(),
                        secs: limit.as_secs(),
                    }
                })??,
            None => child.wait_with_output().await?,
        };

        let result = CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        debug!(
            command = %spec,
            exit_code = result.exit_code,
            duration_ms = result.duration_ms,
            "command finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_rendering() {
        let spec = CommandSpec::new("git")
            .args(["tag", "-a", "1.3.0"])
            .current_dir("/tmp");
        assert_eq!(spec.to_string(), "git tag -a 1.3.0");
        assert_eq!(spec.cwd.as_deref(), Some(Path::new("/tmp")));
    }

    #[test]
    fn test_from_argv_rejects_empty() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            CommandSpec::from_argv(&empty),
            Err(ExecError::EmptyCommand)
        ));
        let spec = CommandSpec::from_argv(&["go", "test", "./..."]).unwrap();
        assert_eq!(spec.program, "go");
        assert_eq!(spec.args, vec!["test", "./..."]);
    }

    #[test]
    fn test_combined_output() {
        let out = CommandOutput {
            exit_code: 1,
            stdout: "  lint: 2 issues\n".to_string(),
            stderr: "exit status 1\n".to_string(),
            duration_ms: 3,
        };
        assert!(!out.success());
        assert_eq!(out.combined(), "lint: 2 issues\nexit status 1");
        assert_eq!(CommandOutput::ok("").combined(), "");
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let spec = CommandSpec::new("echo").arg("hello");
        let out = SystemRunner.run(&spec).await.expect("execute failed");
        assert!(out.success());
        assert!(out.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_execute_failing_command() {
        let out = SystemRunner
            .run(&CommandSpec::new("false"))
            .await
            .expect("execute failed");
        assert!(!out.success());
        assert_ne!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn test_missing_program_is_tool_not_found() {
        let err = SystemRunner
            .run(&CommandSpec::new("fleet-definitely-not-installed-xyz"))
            .await
            .unwrap_err();
        assert!(err.is_tool_missing(), "got {err:?}");
    }

    #[tokio::test]
    async fn test_env_and_cwd_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo $FLEET_BUILD_VERSION; pwd"])
            .env("FLEET_BUILD_VERSION", "1.2.3")
            .current_dir(dir.path());
        let out = SystemRunner.run(&spec).await.unwrap();
        assert!(out.stdout.starts_with("1.2.3\n"));
        let name = dir.path().file_name().unwrap().to_str().unwrap();
        assert!(out.stdout.trim_end().ends_with(name));
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let spec = CommandSpec::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(100));
        let err = SystemRunner.run(&spec).await.unwrap_err();
        assert!(matches!(err, ExecError::Timeout { .. }));
    }
}
