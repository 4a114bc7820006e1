//! Static identity of a fleet member.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Fleet category of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Core,
    Backend,
    Frontend,
    ThirdParty,
    Infra,
    Cli,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Core => "core",
            Category::Backend => "backend",
            Category::Frontend => "frontend",
            Category::ThirdParty => "third-party",
            Category::Infra => "infra",
            Category::Cli => "cli",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build toolchain that drives a service's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toolchain {
    Go,
    Cargo,
    Bun,
}

impl fmt::Display for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Toolchain::Go => "go",
            Toolchain::Cargo => "cargo",
            Toolchain::Bun => "bun",
        })
    }
}

/// One `[[services]]` entry.
///
/// Optional fields are resolved through accessors so the configuration file
/// only has to spell out what differs from the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// Canonical id; also the systemd unit name.
    pub id: String,
    /// Short alias used on the command line.
    pub alias: String,
    pub category: Category,
    /// Source checkout. Relative paths are resolved against the config file.
    pub source: PathBuf,
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<Toolchain>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed: Option<bool>,
    /// Frontend build command, default `bun run build`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_script: Option<String>,
}

impl ServiceDefinition {
    pub fn toolchain(&self) -> Toolchain {
        self.toolchain.unwrap_or(match self.category {
            Category::Frontend => Toolchain::Bun,
            _ => Toolchain::Go,
        })
    }

    pub fn binary_name(&self) -> &str {
        self.binary.as_deref().unwrap_or(&self.id)
    }

    /// Whether the service runs as a systemd unit.
    pub fn managed(&self) -> bool {
        self.managed
            .unwrap_or(!matches!(self.category, Category::Cli | Category::Infra))
    }

    pub fn is_frontend(&self) -> bool {
        self.category == Category::Frontend
    }

    pub fn is_cli(&self) -> bool {
        self.category == Category::Cli
    }

    /// Categories the build command can ever touch; `cli` only on request.
    pub fn buildable_category(&self) -> bool {
        !matches!(self.category, Category::Cli | Category::Infra)
    }

    /// Built output: `bin_dir/<binary>`, or `dist/` inside the checkout for
    /// frontends.
    pub fn artifact_path(&self, bin_dir: &Path) -> PathBuf {
        if self.is_frontend() {
            self.source.join("dist")
        } else {
            bin_dir.join(self.binary_name())
        }
    }

    /// The artifact's path relative to the checkout, when it lives inside it.
    /// Version control must never pick this path up.
    pub fn checkout_artifact(&self, bin_dir: &Path) -> Option<PathBuf> {
        self.artifact_path(bin_dir)
            .strip_prefix(&self.source)
            .ok()
            .filter(|rel| !rel.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }

    pub fn build_script(&self) -> &str {
        self.build_script.as_deref().unwrap_or("bun run build")
    }
}

#[cfg(test)]
pub(crate) fn test_service(id: &str, category: Category, source: impl Into<PathBuf>) -> ServiceDefinition {
    ServiceDefinition {
        id: id.to_string(),
        alias: id.chars().take(3).collect(),
        category,
        source: source.into(),
        repository: format!("https://git.example.com/fleet/{id}"),
        port: 8080,
        toolchain: None,
        binary: None,
        managed: None,
        build_script: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_category() {
        let web = test_service("web", Category::Frontend, "/src/web");
        assert_eq!(web.toolchain(), Toolchain::Bun);
        assert!(web.managed());
        assert_eq!(
            web.artifact_path(Path::new("/opt/fleet/bin")),
            PathBuf::from("/src/web/dist")
        );
        assert_eq!(web.build_script(), "bun run build");

        let cli = test_service("fleet", Category::Cli, "/src/fleet");
        assert_eq!(cli.toolchain(), Toolchain::Go);
        assert!(!cli.managed());
        assert!(!cli.buildable_category());

        let cache = test_service("cache", Category::Infra, "/src/cache");
        assert!(!cache.managed());
        assert!(!cache.buildable_category());
    }

    #[test]
    fn test_explicit_fields_win() {
        let mut api = test_service("api", Category::Backend, "/src/api");
        api.toolchain = Some(Toolchain::Cargo);
        api.binary = Some("api-server".to_string());
        api.managed = Some(false);
        assert_eq!(api.toolchain(), Toolchain::Cargo);
        assert_eq!(api.binary_name(), "api-server");
        assert_eq!(
            api.artifact_path(Path::new("/opt/fleet/bin")),
            PathBuf::from("/opt/fleet/bin/api-server")
        );
        assert!(!api.managed());
    }

    #[test]
    fn test_checkout_artifact_only_inside_source() {
        let bin = Path::new("/opt/fleet/bin");
        let web = test_service("web", Category::Frontend, "/src/web");
        assert_eq!(web.checkout_artifact(bin), Some(PathBuf::from("dist")));

        let api = test_service("api", Category::Backend, "/src/api");
        assert_eq!(api.checkout_artifact(bin), None);

        let nested = test_service("api", Category::Backend, "/src/api");
        assert_eq!(
            nested.checkout_artifact(Path::new("/src/api/out")),
            Some(PathBuf::from("out/api"))
        );
    }

    #[test]
    fn test_category_serde() {
        let c: Category = serde_json::from_str("\"third-party\"").unwrap();
        assert_eq!(c, Category::ThirdParty);
        assert_eq!(c.to_string(), "third-party");
    }
}
