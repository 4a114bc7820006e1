//! systemd unit installation.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fleet_exec::{CommandRunner, CommandSpec};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::{FleetConfig, SystemdConfig};
use crate::domain::error::{FleetError, Result};
use crate::domain::service::ServiceDefinition;
use crate::pipeline::BuildArtifact;

/// `systemctl`, with `--user` when units live in the user manager.
pub fn systemctl(user: bool) -> CommandSpec {
    let spec = CommandSpec::new("systemctl");
    if user {
        spec.arg("--user")
    } else {
        spec
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InstallOutcome {
    /// The service has no unit identity.
    Skipped,
    Installed { unit_path: PathBuf },
}

pub struct InstallManager {
    runner: Arc<dyn CommandRunner>,
    systemd: SystemdConfig,
    unit_dir: PathBuf,
    log_dir: PathBuf,
}

impl InstallManager {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &FleetConfig) -> Self {
        Self {
            runner,
            systemd: config.systemd.clone(),
            unit_dir: config.paths.unit_dir.clone(),
            log_dir: config.paths.log_dir.clone(),
        }
    }

    pub fn unit_path(&self, service: &ServiceDefinition) -> PathBuf {
        self.unit_dir.join(format!("{}.service", service.id))
    }

    pub fn log_path(&self, service: &ServiceDefinition) -> PathBuf {
        self.log_dir.join(format!("{}.log", service.id))
    }

    fn exec_start(&self, service: &ServiceDefinition, artifact: &BuildArtifact) -> String {
        if service.is_frontend() {
            self.systemd
                .static_server
                .replace("{dist}", &artifact.path.display().to_string())
                .replace("{port}", &service.port.to_string())
        } else {
            artifact.path.display().to_string()
        }
    }

    /// Unit file text for `service`.
    pub fn render_unit(&self, service: &ServiceDefinition, artifact: &BuildArtifact) -> String {
        let log = self.log_path(service);
        let wanted_by = if self.systemd.user {
            "default.target"
        } else {
            "multi-user.target"
        };
        let mut unit = format!(
            "[Unit]\n\
             Description=fleet {category} service {id}\n\
             After=network-online.target\n\
             \n\
             [Service]\n\
             Type=simple\n\
             WorkingDirectory={workdir}\n\
             ExecStart={exec}\n",
            category = service.category,
            id = service.id,
            workdir = service.source.display(),
            exec = self.exec_start(service, artifact),
        );
        if service.port != 0 {
            unit.push_str(&format!("Environment=PORT={}\n", service.port));
        }
        unit.push_str(&format!(
            "Restart=always\n\
             RestartSec={restart}\n\
             StandardOutput=append:{log}\n\
             StandardError=append:{log}\n\
             \n\
             [Install]\n\
             WantedBy={wanted_by}\n",
            restart = self.systemd.restart_sec,
            log = log.display(),
        ));
        unit
    }

    /// Render the unit, then `daemon-reload`, `enable` and `restart`.
    pub async fn install(
        &self,
        service: &ServiceDefinition,
        artifact: &BuildArtifact,
    ) -> Result<InstallOutcome> {
        if !service.managed() {
            debug!(service = %service.id, "unmanaged service; install skipped");
            return Ok(InstallOutcome::Skipped);
        }

        let install_err = |output: String| FleetError::Install {
            service: service.id.clone(),
            output,
        };

        let unit_path = self.unit_path(service);
        write_atomic(&unit_path, &self.render_unit(service, artifact))
            .map_err(|e| install_err(format!("writing {}: {e}", unit_path.display())))?;
        std::fs::create_dir_all(&self.log_dir)
            .map_err(|e| install_err(format!("creating {}: {e}", self.log_dir.display())))?;

        let steps: [&[&str]; 3] = [
            &["daemon-reload"],
            &["enable", service.id.as_str()],
            &["restart", service.id.as_str()],
        ];
        for args in steps {
            let spec = systemctl(self.systemd.user).args(args.iter().copied());
            let out = self
                .runner
                .run(&spec)
                .await
                .map_err(|e| install_err(format!("{spec}: {e}")))?;
            if !out.success() {
                return Err(install_err(format!("{spec}: {}", out.combined())));
            }
        }

        info!(service = %service.id, unit = %unit_path.display(), "unit installed and restarted");
        Ok(InstallOutcome::Installed { unit_path })
    }
}

fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::service::{test_service, Category};
    use fleet_exec::fakes::RecordingRunner;

    fn manager(runner: Arc<RecordingRunner>, root: &Path) -> InstallManager {
        let mut config = FleetConfig::default();
        config.paths.unit_dir = root.join("units");
        config.paths.log_dir = root.join("logs");
        InstallManager::new(runner, &config)
    }

    fn binary_artifact(path: &str) -> BuildArtifact {
        BuildArtifact {
            path: PathBuf::from(path),
            size_bytes: 10,
            is_directory: false,
        }
    }

    #[tokio::test]
    async fn test_install_writes_unit_and_activates() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let mgr = manager(runner.clone(), root.path());
        let svc = test_service("gateway", Category::Core, "/src/gateway");

        let outcome = mgr
            .install(&svc, &binary_artifact("/src/gateway/gateway"))
            .await
            .unwrap();
        let unit_path = root.path().join("units/gateway.service");
        assert_eq!(
            outcome,
            InstallOutcome::Installed {
                unit_path: unit_path.clone()
            }
        );

        let unit = std::fs::read_to_string(&unit_path).unwrap();
        assert!(unit.contains("ExecStart=/src/gateway/gateway\n"));
        assert!(unit.contains("Restart=always\n"));
        assert!(unit.contains("RestartSec=5\n"));
        let log = root.path().join("logs/gateway.log");
        assert!(unit.contains(&format!("StandardOutput=append:{}\n", log.display())));
        assert!(unit.contains(&format!("StandardError=append:{}\n", log.display())));
        assert!(unit.contains("WantedBy=default.target"));

        assert_eq!(
            runner.command_lines(),
            vec![
                "systemctl --user daemon-reload",
                "systemctl --user enable gateway",
                "systemctl --user restart gateway",
            ]
        );
    }

    #[tokio::test]
    async fn test_frontend_served_statically() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let mgr = manager(runner.clone(), root.path());
        let mut web = test_service("console", Category::Frontend, "/src/console");
        web.port = 3000;
        let dist = BuildArtifact {
            path: PathBuf::from("/src/console/dist"),
            size_bytes: 0,
            is_directory: true,
        };

        mgr.install(&web, &dist).await.unwrap();
        let unit = std::fs::read_to_string(root.path().join("units/console.service")).unwrap();
        assert!(unit.contains("ExecStart=bunx serve -s /src/console/dist -l 3000\n"));
        assert!(unit.contains("Environment=PORT=3000\n"));
    }

    #[tokio::test]
    async fn test_unmanaged_service_skipped() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let mgr = manager(runner.clone(), root.path());
        let cli = test_service("fleet", Category::Cli, "/src/fleet");

        let outcome = mgr.install(&cli, &binary_artifact("/src/fleet/fleet")).await.unwrap();
        assert_eq!(outcome, InstallOutcome::Skipped);
        assert!(runner.calls().is_empty());
        assert!(!root.path().join("units").exists());
    }

    #[tokio::test]
    async fn test_activation_failure_surfaces_output() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.fail(
            "systemctl --user restart",
            1,
            "Job for billing.service failed because the control process exited",
        );
        let mgr = manager(runner.clone(), root.path());
        let svc = test_service("billing", Category::Backend, "/src/billing");

        let err = mgr
            .install(&svc, &binary_artifact("/src/billing/billing"))
            .await
            .unwrap_err();
        match err {
            FleetError::Install { service, output } => {
                assert_eq!(service, "billing");
                assert!(output.contains("control process exited"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_system_manager_without_user_flag() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let mut config = FleetConfig::default();
        config.paths.unit_dir = root.path().join("units");
        config.paths.log_dir = root.path().join("logs");
        config.systemd.user = false;
        let mgr = InstallManager::new(runner.clone(), &config);
        let svc = test_service("api", Category::Backend, "/src/api");

        mgr.install(&svc, &binary_artifact("/src/api/api")).await.unwrap();
        assert_eq!(runner.command_lines()[0], "systemctl daemon-reload");
        let unit = std::fs::read_to_string(root.path().join("units/api.service")).unwrap();
        assert!(unit.contains("WantedBy=multi-user.target"));
    }
}
