//! `fleet.toml` configuration.
//!
//! ```toml
//! [paths]
//! dist_repo = "/home/ops/fleet-dist"
//! platform = "linux-amd64"
//!
//! [systemd]
//! user = true
//!
//! [[services]]
//! id = "gateway"
//! alias = "gw"
//! category = "core"
//! source = "../gateway"
//! repository = "https://git.example.com/fleet/gateway"
//! port = 8080
//! ```
//!
//! Every section is optional. Path defaults derive from `HOME`; a handful of
//! `FLEET_*` environment variables override the file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use fleet_exec::LlmConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::error::{FleetError, Result};
use crate::domain::service::ServiceDefinition;
use crate::domain::version::host_arch;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "fleet.toml";

fn home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Filesystem layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Checkout of the distribution repository.
    pub dist_repo: PathBuf,
    /// Manifest file name inside `dist_repo`.
    pub manifest: String,
    /// Platform key for release directories and manifest binaries.
    pub platform: String,
    /// Compiled service binaries; kept out of the source checkouts.
    pub bin_dir: PathBuf,
    /// Where rendered unit files go.
    pub unit_dir: PathBuf,
    /// Per-service append-mode logs.
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home = home();
        PathsConfig {
            dist_repo: home.join("fleet-dist"),
            manifest: "manifest.json".to_string(),
            platform: format!("{}-{}", std::env::consts::OS, host_arch()),
            bin_dir: home.join(".local/share/fleet/bin"),
            unit_dir: home.join(".config/systemd/user"),
            log_dir: home.join(".local/state/fleet/logs"),
        }
    }
}

/// Unit rendering and `systemctl` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemdConfig {
    /// Pass `--user` to `systemctl`.
    pub user: bool,
    pub restart_sec: u64,
    /// Command serving a frontend bundle; `{dist}` and `{port}` are substituted.
    pub static_server: String,
}

impl Default for SystemdConfig {
    fn default() -> Self {
        SystemdConfig {
            user: true,
            restart_sec: 5,
            static_server: "bunx serve -s {dist} -l {port}".to_string(),
        }
    }
}

/// Cross-invocation exclusivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    pub dir: PathBuf,
    pub heartbeat_ms: u64,
    pub ttl_secs: u64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        CoordinationConfig {
            dir: home().join(".local/state/fleet/coord"),
            heartbeat_ms: 1000,
            ttl_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Webhook receiving critical notifications; log-only when unset.
    pub webhook_url: Option<String>,
}

/// Whole configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub paths: PathsConfig,
    pub systemd: SystemdConfig,
    pub coordination: CoordinationConfig,
    pub notify: NotifyConfig,
    pub llm: LlmConfig,
    pub services: Vec<ServiceDefinition>,
}

impl FleetConfig {
    /// Read, resolve, override from the environment and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            FleetError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_relative(base);
        config.apply_env_overrides();
        config.validate()?;
        debug!(path = %path.display(), services = config.services.len(), "config loaded");
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| FleetError::Config(e.to_string()))
    }

    /// Make every relative path in the document absolute against `base`.
    pub fn resolve_relative(&mut self, base: &Path) {
        let absolute = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        for svc in &mut self.services {
            absolute(&mut svc.source);
        }
        absolute(&mut self.paths.dist_repo);
        absolute(&mut self.paths.bin_dir);
        absolute(&mut self.paths.unit_dir);
        absolute(&mut self.paths.log_dir);
        absolute(&mut self.coordination.dir);
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply `FLEET_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("FLEET_DIST_REPO") {
            self.paths.dist_repo = PathBuf::from(v);
        }
        if let Some(v) = get("FLEET_BIN_DIR") {
            self.paths.bin_dir = PathBuf::from(v);
        }
        if let Some(v) = get("FLEET_PLATFORM") {
            self.paths.platform = v;
        }
        if let Some(v) = get("FLEET_NOTIFY_URL") {
            self.notify.webhook_url = Some(v);
        }
        if let Some(v) = get("FLEET_LLM_URL") {
            self.llm.url = v;
        }
        if let Some(v) = get("FLEET_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("FLEET_COORD_DIR") {
            self.coordination.dir = PathBuf::from(v);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        let mut aliases = HashSet::new();
        for svc in &self.services {
            if svc.id.trim().is_empty() {
                return Err(FleetError::Config("service with empty id".to_string()));
            }
            if svc.alias.trim().is_empty() {
                return Err(FleetError::Config(format!("service {} has an empty alias", svc.id)));
            }
            if svc.source.as_os_str().is_empty() {
                return Err(FleetError::Config(format!("service {} has no source path", svc.id)));
            }
            if !ids.insert(svc.id.as_str()) {
                return Err(FleetError::Config(format!("duplicate service id {}", svc.id)));
            }
            if !aliases.insert(svc.alias.as_str()) {
                return Err(FleetError::Config(format!("duplicate service alias {}", svc.alias)));
            }
        }
        if self.paths.platform.trim().is_empty() {
            return Err(FleetError::Config("paths.platform must not be empty".to_string()));
        }
        if self.paths.manifest.trim().is_empty() {
            return Err(FleetError::Config("paths.manifest must not be empty".to_string()));
        }
        if self.coordination.heartbeat_ms == 0 || self.coordination.ttl_secs == 0 {
            return Err(FleetError::Config(
                "coordination heartbeat and ttl must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.paths.dist_repo.join(&self.paths.manifest)
    }

    /// Look a service up by id or alias.
    pub fn find_service(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services
            .iter()
            .find(|s| s.id == name || s.alias == name)
    }
}
