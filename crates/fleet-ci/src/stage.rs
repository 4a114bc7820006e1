//! Build stage definitions per toolchain.

use std::path::Path;

use serde::Serialize;

use fleet_core::{ServiceDefinition, Toolchain, Version};
use fleet_exec::CommandSpec;

/// Environment variable carrying the long version into every compile step.
pub const VERSION_ENV: &str = "FLEET_BUILD_VERSION";

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinStage {
    /// Dependency resolution: `go mod tidy`, `cargo fetch`, `bun install`
    Tidy,

    /// Formatters, plus the TypeScript typecheck for frontends
    Format,

    /// Linters; every linter listed must pass
    Lint,

    /// Unit tests
    Test,

    /// Produces the artifact
    Compile,
}

impl BuiltinStage {
    pub const ALL: [BuiltinStage; 5] = [
        BuiltinStage::Tidy,
        BuiltinStage::Format,
        BuiltinStage::Lint,
        BuiltinStage::Test,
        BuiltinStage::Compile,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinStage::Tidy => "tidy",
            BuiltinStage::Format => "format",
            BuiltinStage::Lint => "lint",
            BuiltinStage::Test => "test",
            BuiltinStage::Compile => "compile",
        }
    }

    /// A missing tool fails the stage instead of being skipped.
    pub fn requires_tools(&self) -> bool {
        matches!(self, BuiltinStage::Compile)
    }
}

/// One stage for one service: commands run in order, each must succeed.
#[derive(Debug, Clone)]
pub struct StageConfig {
    pub stage: BuiltinStage,

    /// Commands to execute, already bound to the service directory.
    pub commands: Vec<CommandSpec>,

    /// Set when the stage does not apply to this service.
    pub skip_reason: Option<String>,
}

impl StageConfig {
    pub fn new(stage: BuiltinStage, commands: Vec<CommandSpec>) -> Self {
        Self {
            stage,
            commands,
            skip_reason: None,
        }
    }

    pub fn skipped(stage: BuiltinStage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            commands: Vec::new(),
            skip_reason: Some(reason.into()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.stage.name()
    }

    pub fn enabled(&self) -> bool {
        self.skip_reason.is_none()
    }
}

fn cmd(dir: &Path, argv: &[&str]) -> CommandSpec {
    CommandSpec::new(argv[0])
        .args(argv[1..].iter().copied())
        .current_dir(dir)
}

/// Stages for `service`, stamping `version` into the compile step. Binaries
/// are written under `bin_dir`.
pub fn stages_for(
    service: &ServiceDefinition,
    version: &Version,
    bin_dir: &Path,
) -> Vec<StageConfig> {
    let long = version.to_string();
    let dir = service.source.as_path();
    match service.toolchain() {
        Toolchain::Go => go_stages(dir, &service.artifact_path(bin_dir), &long),
        Toolchain::Cargo => cargo_stages(dir, &long),
        Toolchain::Bun => bun_stages(dir, service.build_script(), &long),
    }
}

pub fn go_stages(dir: &Path, output: &Path, long: &str) -> Vec<StageConfig> {
    let ldflags = format!("-X main.version={long}");
    let output = output.display().to_string();
    vec![
        StageConfig::new(BuiltinStage::Tidy, vec![cmd(dir, &["go", "mod", "tidy"])]),
        StageConfig::new(BuiltinStage::Format, vec![cmd(dir, &["gofmt", "-w", "."])]),
        StageConfig::new(
            BuiltinStage::Lint,
            vec![cmd(dir, &["golangci-lint", "run", "./..."])],
        ),
        StageConfig::new(BuiltinStage::Test, vec![cmd(dir, &["go", "test", "./..."])]),
        StageConfig::new(
            BuiltinStage::Compile,
            vec![cmd(dir, &["go", "build", "-ldflags", ldflags.as_str(), "-o", output.as_str()])
                .env(VERSION_ENV, long)],
        ),
    ]
}

/// The release binary still has to be copied out of `target/release`.
pub fn cargo_stages(dir: &Path, long: &str) -> Vec<StageConfig> {
    vec![
        StageConfig::new(BuiltinStage::Tidy, vec![cmd(dir, &["cargo", "fetch"])]),
        StageConfig::new(BuiltinStage::Format, vec![cmd(dir, &["cargo", "fmt", "--all"])]),
        StageConfig::new(
            BuiltinStage::Lint,
            vec![cmd(
                dir,
                &["cargo", "clippy", "--all-targets", "--", "-D", "warnings"],
            )],
        ),
        StageConfig::new(BuiltinStage::Test, vec![cmd(dir, &["cargo", "test"])]),
        StageConfig::new(
            BuiltinStage::Compile,
            vec![cmd(dir, &["cargo", "build", "--release"]).env(VERSION_ENV, long)],
        ),
    ]
}

pub fn bun_stages(dir: &Path, build_script: &str, long: &str) -> Vec<StageConfig> {
    let test = if has_test_config(dir) {
        StageConfig::new(BuiltinStage::Test, vec![cmd(dir, &["bun", "run", "test"])])
    } else {
        StageConfig::skipped(BuiltinStage::Test, "no test configuration")
    };
    let build_argv: Vec<&str> = build_script.split_whitespace().collect();
    let compile = if build_argv.is_empty() {
        StageConfig::new(BuiltinStage::Compile, Vec::new())
    } else {
        StageConfig::new(
            BuiltinStage::Compile,
            vec![cmd(dir, &build_argv).env(VERSION_ENV, long)],
        )
    };
    vec![
        StageConfig::new(BuiltinStage::Tidy, vec![cmd(dir, &["bun", "install"])]),
        StageConfig::new(
            BuiltinStage::Format,
            vec![
                cmd(dir, &["bunx", "tsc", "--noEmit"]),
                cmd(dir, &["bunx", "prettier", "--write", "."]),
            ],
        ),
        StageConfig::new(
            BuiltinStage::Lint,
            vec![
                cmd(dir, &["bunx", "eslint", "."]),
                cmd(dir, &["bunx", "biome", "lint", "."]),
            ],
        ),
        test,
        compile,
    ]
}

/// `vitest.config.*` or `jest.config.*` at the top of the checkout.
pub fn has_test_config(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        name.starts_with("vitest.config.") || name.starts_with("jest.config.")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lines(stage: &StageConfig) -> Vec<String> {
        stage.commands.iter().map(CommandSpec::command_line).collect()
    }

    #[test]
    fn test_stage_order_and_names() {
        let names: Vec<&str> = BuiltinStage::ALL.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["tidy", "format", "lint", "test", "compile"]);
        assert!(BuiltinStage::Compile.requires_tools());
        assert!(!BuiltinStage::Lint.requires_tools());
    }

    #[test]
    fn test_go_compile_stamps_version() {
        let long = "1.3.0.main.4f2a9c1.20261016120000.amd64.0c1d2e3f";
        let stages = go_stages(
            Path::new("/src/gateway"),
            Path::new("/opt/fleet/bin/gateway"),
            long,
        );
        let stage_names: Vec<&str> = stages.iter().map(StageConfig::name).collect();
        assert_eq!(stage_names, vec!["tidy", "format", "lint", "test", "compile"]);

        let compile = &stages[4].commands[0];
        let ldflags = format!("-X main.version={long}");
        assert_eq!(
            compile.args,
            vec!["build", "-ldflags", ldflags.as_str(), "-o", "/opt/fleet/bin/gateway"]
        );
        assert!(compile
            .env
            .contains(&(VERSION_ENV.to_string(), long.to_string())));
        assert_eq!(compile.cwd.as_deref(), Some(Path::new("/src/gateway")));
        assert_eq!(lines(&stages[2]), vec!["golangci-lint run ./..."]);
    }

    #[test]
    fn test_cargo_stages() {
        let stages = cargo_stages(Path::new("/src/indexer"), "1.0.0");
        assert_eq!(lines(&stages[0]), vec!["cargo fetch"]);
        assert_eq!(
            lines(&stages[2]),
            vec!["cargo clippy --all-targets -- -D warnings"]
        );
        assert_eq!(lines(&stages[4]), vec!["cargo build --release"]);
        assert!(!stages[4].commands[0].env.is_empty());
    }

    #[test]
    fn test_bun_without_test_config_skips_tests() {
        let tmp = TempDir::new().unwrap();
        let stages = bun_stages(tmp.path(), "bun run build", "1.0.0");
        assert!(!stages[3].enabled());
        assert_eq!(stages[3].skip_reason.as_deref(), Some("no test configuration"));
        assert_eq!(
            lines(&stages[2]),
            vec!["bunx eslint .", "bunx biome lint ."]
        );
        assert_eq!(
            lines(&stages[1]),
            vec!["bunx tsc --noEmit", "bunx prettier --write ."]
        );
        assert_eq!(lines(&stages[4]), vec!["bun run build"]);
    }

    #[test]
    fn test_bun_with_vitest_config_runs_tests() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("vitest.config.ts"), "export default {}").unwrap();
        let stages = bun_stages(tmp.path(), "bun run build:prod", "1.0.0");
        assert!(stages[3].enabled());
        assert_eq!(lines(&stages[3]), vec!["bun run test"]);
        assert_eq!(lines(&stages[4]), vec!["bun run build:prod"]);
    }

    #[test]
    fn test_has_test_config_variants() {
        let tmp = TempDir::new().unwrap();
        assert!(!has_test_config(tmp.path()));
        assert!(!has_test_config(&tmp.path().join("missing")));
        std::fs::write(tmp.path().join("jest.config.js"), "").unwrap();
        assert!(has_test_config(tmp.path()));
    }
}
