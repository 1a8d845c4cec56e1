use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::models::{Dependencies, DependencyGraph, Import, Module, ModuleType, Package, PackageId};

#[derive(Debug, Deserialize)]
struct CargoLock {
    #[serde(default)]
    package: Vec<CargoLockPackage>,
}

#[derive(Debug, Deserialize)]
struct CargoLockPackage {
    name: String,
    version: String,
    /// Packages without a `source` field are local workspace members.
    source: Option<String>,
    /// Entries are `name`, `name version` or `name version (source)`.
    #[serde(default)]
    dependencies: Vec<String>,
}

/// Reads `Cargo.lock`. Workspace members are roots; registry and git
/// packages form the transitive graph.
pub struct CargoAnalyzer {
    root: PathBuf,
    name: String,
}

impl CargoAnalyzer {
    pub fn new(module: &Module) -> Result<Self> {
        Ok(Self {
            root: super::existing_dir(module)?,
            name: module.name.clone(),
        })
    }
}

#[async_trait]
impl super::Analyzer for CargoAnalyzer {
    async fn is_built(&self) -> Result<bool> {
        Ok(self.root.join("target").is_dir())
    }

    async fn analyze(&self) -> Result<Dependencies> {
        let lock_path = self.root.join("Cargo.lock");
        if !lock_path.exists() {
            bail!(
                "no Cargo.lock in {} (run `cargo generate-lockfile` first)",
                self.root.display()
            );
        }

        let content = super::read_manifest(&lock_path)?;
        let lock: CargoLock = toml::from_str(&content)
            .with_context(|| format!("could not parse {}", lock_path.display()))?;

        let deps = resolve_lock(lock, &self.name);
        debug!(
            module = %self.name,
            direct = deps.direct.len(),
            transitive = deps.transitive.len(),
            "parsed Cargo.lock"
        );
        Ok(deps)
    }
}

fn resolve_lock(lock: CargoLock, module_name: &str) -> Dependencies {
    let mut versions: HashMap<&str, Vec<&str>> = HashMap::new();
    for p in &lock.package {
        versions.entry(p.name.as_str()).or_default().push(p.version.as_str());
    }

    let is_local = |name: &str, version: &str| {
        lock.package
            .iter()
            .any(|p| p.name == name && p.version == version && p.source.is_none())
    };

    // Resolve a `dependencies` entry to (name, version).
    let resolve = |entry: &str| -> Option<(String, String)> {
        let mut parts = entry.split_whitespace();
        let name = parts.next()?;
        match parts.next() {
            Some(version) => Some((name.to_string(), version.to_string())),
            None => {
                let candidates = versions.get(name)?;
                (candidates.len() == 1).then(|| (name.to_string(), candidates[0].to_string()))
            }
        }
    };

    let mut transitive = DependencyGraph::new();
    for p in lock.package.iter().filter(|p| p.source.is_some()) {
        let id = PackageId::new(ModuleType::Cargo, p.name.clone(), p.version.clone());
        let deps: BTreeSet<PackageId> = p
            .dependencies
            .iter()
            .filter_map(|entry| resolve(entry.as_str()))
            .filter(|(name, version)| !is_local(name.as_str(), version.as_str()))
            .map(|(name, version)| PackageId::new(ModuleType::Cargo, name, version))
            .collect();
        transitive.insert(id.clone(), Package { id, deps });
    }

    let locals: Vec<&CargoLockPackage> =
        lock.package.iter().filter(|p| p.source.is_none()).collect();
    let roots: Vec<&CargoLockPackage> = match locals.iter().find(|p| p.name == module_name) {
        Some(root) => vec![*root],
        None => locals.clone(),
    };

    let mut direct = Vec::new();
    let mut seen = BTreeSet::new();
    for root in &roots {
        for entry in &root.dependencies {
            let Some((name, version)) = resolve(entry.as_str()) else {
                continue;
            };
            if is_local(name.as_str(), version.as_str()) {
                continue;
            }
            let id = PackageId::new(ModuleType::Cargo, name, version);
            if seen.insert(id.clone()) {
                direct.push(Import::new(entry.clone(), id));
            }
        }
    }

    let revision = locals
        .iter()
        .find(|p| p.name == module_name)
        .map(|p| p.version.clone());

    Dependencies {
        direct,
        transitive,
        revision,
    }
}
