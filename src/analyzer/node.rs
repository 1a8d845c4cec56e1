use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::models::{Dependencies, DependencyGraph, Import, Module, ModuleType, Package, PackageId};

/// Analyzer for npm projects.
///
/// `package-lock.json` (v2/v3 `packages` map) yields the full graph. Without a
/// lockfile, `package.json` declarations are reported as direct imports with
/// their declared ranges.
pub struct NpmAnalyzer {
    root: PathBuf,
}

impl NpmAnalyzer {
    pub fn new(module: &Module) -> Result<Self> {
        Ok(Self {
            root: super::existing_dir(module)?,
        })
    }
}

#[async_trait]
impl super::Analyzer for NpmAnalyzer {
    async fn is_built(&self) -> Result<bool> {
        Ok(self.root.join("node_modules").is_dir())
    }

    async fn analyze(&self) -> Result<Dependencies> {
        let lock = self.root.join("package-lock.json");
        if lock.exists() {
            return parse_package_lock_json(&lock);
        }

        let pkg = self.root.join("package.json");
        if pkg.exists() {
            return parse_package_json(&pkg);
        }

        bail!(
            "neither package-lock.json nor package.json found in {}",
            self.root.display()
        )
    }
}

fn npm_id(name: &str, version: &str) -> PackageId {
    PackageId::new(ModuleType::Npm, name, version)
}

/// Package name from a lockfile path: `node_modules/a/node_modules/@s/b` → `@s/b`.
fn name_from_path(pkg_path: &str) -> &str {
    match pkg_path.rfind("node_modules/") {
        Some(idx) => &pkg_path[idx + "node_modules/".len()..],
        None => pkg_path,
    }
}

/// Node's lookup: nearest `node_modules/<name>` walking up from `from`.
fn resolve_path(packages: &Map<String, Value>, from: &str, name: &str) -> Option<String> {
    let mut base = from.to_string();
    loop {
        let candidate = if base.is_empty() {
            format!("node_modules/{}", name)
        } else {
            format!("{}/node_modules/{}", base, name)
        };
        if packages.contains_key(&candidate) {
            return Some(candidate);
        }
        if base.is_empty() {
            return None;
        }
        base = match base.rfind("/node_modules/") {
            Some(idx) => base[..idx].to_string(),
            None => String::new(),
        };
    }
}

fn declared_names(info: &Value) -> Vec<String> {
    ["dependencies", "optionalDependencies", "peerDependencies"]
        .iter()
        .filter_map(|section| info.get(section).and_then(|v| v.as_object()))
        .flat_map(|deps| deps.keys().cloned())
        .collect()
}

fn version_of(packages: &Map<String, Value>, pkg_path: &str) -> String {
    packages
        .get(pkg_path)
        .and_then(|info| info.get("version"))
        .and_then(|v| v.as_str())
        .unwrap_or("*")
        .to_string()
}

/// Parse `package-lock.json` v2/v3 (the `packages` map).
fn parse_package_lock_json(lock_path: &Path) -> Result<Dependencies> {
    let content = super::read_manifest(lock_path)?;
    let json: Value = serde_json::from_str(&content)
        .with_context(|| format!("could not parse {}", lock_path.display()))?;

    let Some(packages) = json.get("packages").and_then(|v| v.as_object()) else {
        bail!(
            "{} has no `packages` map (lockfile v1 is not supported, run `npm install` with npm 7+)",
            lock_path.display()
        );
    };

    let mut transitive = DependencyGraph::new();
    for (pkg_path, info) in packages {
        // The root entry has an empty key; linked workspaces are not packages.
        if pkg_path.is_empty() || !pkg_path.contains("node_modules/") {
            continue;
        }
        if info.get("dev").and_then(|v| v.as_bool()).unwrap_or(false) {
            continue;
        }

        let id = npm_id(name_from_path(pkg_path), &version_of(packages, pkg_path));
        let deps: BTreeSet<PackageId> = declared_names(info)
            .iter()
            .filter_map(|dep| resolve_path(packages, pkg_path, dep))
            .map(|resolved| npm_id(name_from_path(&resolved), &version_of(packages, &resolved)))
            .collect();
        transitive.insert(id.clone(), Package { id, deps });
    }

    let root = packages.get("").cloned().unwrap_or(Value::Null);
    let mut direct = Vec::new();
    let mut seen = HashSet::new();
    for dep in declared_names(&root) {
        let Some(resolved) = resolve_path(packages, "", &dep) else {
            continue;
        };
        let id = npm_id(&dep, &version_of(packages, &resolved));
        if transitive.contains_key(&id) && seen.insert(id.clone()) {
            direct.push(Import::new(dep, id));
        }
    }

    let revision = root
        .get("version")
        .or_else(|| json.get("version"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    Ok(Dependencies {
        direct,
        transitive,
        revision,
    })
}

/// Parse `package.json`: `dependencies` only, versions are declared ranges.
fn parse_package_json(path: &Path) -> Result<Dependencies> {
    let content = super::read_manifest(path)?;
    let json: Value = serde_json::from_str(&content)
        .with_context(|| format!("could not parse {}", path.display()))?;

    let mut deps = Dependencies {
        revision: json.get("version").and_then(|v| v.as_str()).map(str::to_string),
        ..Dependencies::default()
    };

    if let Some(pkgs) = json.get("dependencies").and_then(|v| v.as_object()) {
        for (name, range) in pkgs {
            let range = range.as_str().unwrap_or("*");
            let version = range
                .trim_start_matches(|c: char| !c.is_ascii_digit() && c != '*')
                .to_string();
            let id = npm_id(name, &version);
            deps.direct
                .push(Import::new(format!("{}@{}", name, range), id.clone()));
            deps.transitive.insert(id.clone(), Package::leaf(id));
        }
    }

    Ok(deps)
}
