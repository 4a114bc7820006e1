//! Workspace manifest hygiene: one version for the whole fleet toolchain.
//!
//! The workspace version is what `fleet --version` reports, so every member
//! inherits it and every internal dependency pins it.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .unwrap()
        .to_path_buf()
}

fn read_toml(path: &Path) -> toml::Value {
    let raw = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("reading {}: {e}", path.display()));
    raw.parse()
        .unwrap_or_else(|e| panic!("parsing {}: {e}", path.display()))
}

fn root_manifest() -> toml::Value {
    read_toml(&workspace_root().join("Cargo.toml"))
}

fn members() -> Vec<String> {
    root_manifest()["workspace"]["members"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_str().unwrap().to_string())
        .collect()
}

#[test]
fn members_inherit_the_workspace_version() {
    for member in members() {
        let manifest = read_toml(&workspace_root().join(&member).join("Cargo.toml"));
        let package = &manifest["package"];
        let name = package["name"].as_str().unwrap();
        assert!(name.starts_with("fleet-"), "{member}: unexpected package name {name}");
        assert_eq!(
            package["version"].get("workspace").and_then(toml::Value::as_bool),
            Some(true),
            "{member} must use version.workspace = true"
        );
    }
}

#[test]
fn every_crate_directory_is_a_member() {
    let listed: BTreeSet<String> = members().into_iter().collect();
    let on_disk: BTreeSet<String> = std::fs::read_dir(workspace_root().join("crates"))
        .unwrap()
        .flatten()
        .filter(|entry| entry.path().join("Cargo.toml").is_file())
        .map(|entry| format!("crates/{}", entry.file_name().to_string_lossy()))
        .collect();
    assert_eq!(listed, on_disk);
}

#[test]
fn internal_dependencies_pin_the_workspace_version() {
    let root = root_manifest();
    let version = root["workspace"]["package"]["version"].as_str().unwrap();
    assert_eq!(version, env!("CARGO_PKG_VERSION"));

    let members: BTreeSet<String> = members().into_iter().collect();
    let deps = root["workspace"]["dependencies"].as_table().unwrap();
    let internal: Vec<_> = deps.iter().filter(|(name, _)| name.starts_with("fleet-")).collect();
    assert!(!internal.is_empty());

    for (name, spec) in internal {
        let path = spec["path"].as_str().unwrap();
        assert!(members.contains(path), "{name} points at {path}, not a member");
        assert_eq!(spec["version"].as_str(), Some(version), "{name} version drifted");
    }
}
