use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use tracing::debug;

use crate::models::{Dependencies, Import, Module, ModuleType, Package, PackageId};

/// Analyzer for NuGet projects.
///
/// Direct references come from SDK-style `*.csproj` / `*.fsproj`
/// (`<PackageReference>`) and legacy `packages.config`. When a `paket.lock`
/// is present it supplies resolved versions and the edges between packages.
pub struct NugetAnalyzer {
    root: PathBuf,
}

impl NugetAnalyzer {
    pub fn new(module: &Module) -> Result<Self> {
        Ok(Self {
            root: super::existing_dir(module)?,
        })
    }
}

#[async_trait]
impl super::Analyzer for NugetAnalyzer {
    async fn is_built(&self) -> Result<bool> {
        Ok(self.root.join("obj").is_dir() || self.root.join("bin").is_dir())
    }

    async fn analyze(&self) -> Result<Dependencies> {
        let mut references = Vec::new();
        let mut found = false;

        for project in project_files(&self.root)? {
            found = true;
            let content = super::read_manifest(&project)?;
            references.extend(
                parse_references(&content, "PackageReference", "Include", "Version")
                    .with_context(|| format!("invalid project file {}", project.display()))?,
            );
        }

        let packages_config = self.root.join("packages.config");
        if packages_config.exists() {
            found = true;
            let content = super::read_manifest(&packages_config)?;
            references.extend(
                parse_references(&content, "package", "id", "version")
                    .context("invalid packages.config")?,
            );
        }

        let paket_lock = self.root.join("paket.lock");
        let lock = if paket_lock.exists() {
            found = true;
            parse_paket_lock(&super::read_manifest(&paket_lock)?)?
        } else {
            Vec::new()
        };

        if !found {
            bail!(
                "no *.csproj, packages.config or paket.lock in {}",
                self.root.display()
            );
        }
        Ok(resolve(references, lock))
    }
}

fn project_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(root)
        .with_context(|| format!("could not list {}", root.display()))?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|s| s.to_str()),
                Some("csproj" | "fsproj")
            )
        })
        .collect();
    files.sort();
    Ok(files)
}

/// A package reference as declared: name plus (possibly empty) version.
#[derive(Debug, Clone, PartialEq)]
struct Reference {
    name: String,
    version: String,
}

/// A resolved `paket.lock` entry and the names it depends on. `group` is
/// the lock file group it was resolved in (`Main` unless under `GROUP`).
#[derive(Debug, PartialEq)]
struct LockedPackage {
    group: String,
    name: String,
    version: String,
    deps: Vec<String>,
}

/// Collect `name_attr` / `version_attr` attribute pairs of every `tag`
/// element, e.g. `<PackageReference Include=".." Version=".." />`.
fn parse_references(
    content: &str,
    tag: &str,
    name_attr: &str,
    version_attr: &str,
) -> Result<Vec<Reference>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut refs = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(ref e) | Event::Start(ref e) if e.name().local_name().as_ref() == tag.as_bytes() => {
                let mut name = String::new();
                let mut version = String::new();
                for attr in e.attributes().flatten() {
                    let value = attr.unescape_value().unwrap_or_default().into_owned();
                    let key = attr.key.local_name();
                    if key.as_ref() == name_attr.as_bytes() {
                        name = value;
                    } else if key.as_ref() == version_attr.as_bytes() {
                        version = value;
                    }
                }
                if !name.is_empty() {
                    refs.push(Reference { name, version });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(refs)
}

/// Parse the `NUGET` sections of `paket.lock`. Packages sit at four spaces
/// of indentation (`    Serilog (2.12.0)`), their dependencies at six
/// (`      Microsoft.CSharp (>= 4.3)`). A `GROUP <name>` line starts a new
/// group, which resolves its packages independently of the others.
fn parse_paket_lock(content: &str) -> Result<Vec<LockedPackage>> {
    let package_re = Regex::new(r"^ {4}(\S+) \(([^)]+)\)")?;
    let dep_re = Regex::new(r"^ {6}(\S+)")?;

    let mut packages: Vec<LockedPackage> = Vec::new();
    let mut group = MAIN_GROUP.to_string();
    let mut in_nuget = false;
    for line in content.lines() {
        if !line.starts_with(' ') && !line.trim().is_empty() {
            let header = line.trim_end();
            if let Some(name) = header.strip_prefix("GROUP ") {
                group = name.trim().to_string();
            }
            in_nuget = header == "NUGET";
            continue;
        }
        if !in_nuget {
            continue;
        }
        if let Some(caps) = dep_re.captures(line) {
            if let Some(current) = packages.last_mut() {
                current.deps.push(caps[1].to_string());
            }
        } else if let Some(caps) = package_re.captures(line) {
            packages.push(LockedPackage {
                group: group.clone(),
                name: caps[1].to_string(),
                version: caps[2].to_string(),
                deps: Vec::new(),
            });
        }
    }
    Ok(packages)
}

const MAIN_GROUP: &str = "Main";

/// Build the graph. NuGet names are case-insensitive, so lookups go through
/// lowercased names while ids keep the declared spelling.
///
/// Edges resolve within the package's own `paket.lock` group. A package
/// locked at different versions in several groups keeps one node per
/// version; direct references by name take the first group's version.
fn resolve(references: Vec<Reference>, lock: Vec<LockedPackage>) -> Dependencies {
    let id_of = |p: &LockedPackage| PackageId::new(ModuleType::Nuget, p.name.clone(), p.version.clone());

    let mut in_group: HashMap<(&str, String), PackageId> = HashMap::new();
    let mut by_name: HashMap<String, PackageId> = HashMap::new();
    for package in &lock {
        let id = id_of(package);
        in_group.insert((package.group.as_str(), package.name.to_lowercase()), id.clone());
        let first = by_name.entry(package.name.to_lowercase()).or_insert_with(|| id.clone());
        if first.revision != id.revision {
            debug!(
                package = %package.name,
                kept = %first.revision,
                group = %package.group,
                other = %id.revision,
                "package locked at several versions"
            );
        }
    }

    let mut deps = Dependencies::default();
    for package in &lock {
        let id = id_of(package);
        let edges = package.deps.iter().filter_map(|name| {
            let name = name.to_lowercase();
            in_group
                .get(&(package.group.as_str(), name.clone()))
                .or_else(|| by_name.get(&name))
                .cloned()
        });
        deps.transitive
            .entry(id.clone())
            .or_insert_with(|| Package::leaf(id))
            .deps
            .extend(edges);
    }

    if references.is_empty() {
        // paket-only projects: every locked package is referenced
        let mut seen = BTreeSet::new();
        for package in &lock {
            let id = id_of(package);
            if seen.insert(id.clone()) {
                let target = format!("{}@{}", package.name, package.version);
                deps.direct.push(Import::new(target, id));
            }
        }
        return deps;
    }

    let mut seen = BTreeSet::new();
    for reference in references {
        if !seen.insert(reference.name.to_lowercase()) {
            continue;
        }
        let id = match by_name.get(&reference.name.to_lowercase()) {
            Some(id) => id.clone(),
            None => {
                let id = PackageId::new(ModuleType::Nuget, reference.name.clone(), reference.version.clone());
                deps.transitive
                    .entry(id.clone())
                    .or_insert_with(|| Package::leaf(id.clone()));
                id
            }
        };
        let target = if reference.version.is_empty() {
            reference.name
        } else {
            format!("{}@{}", reference.name, reference.version)
        };
        deps.direct.push(Import::new(target, id));
    }
    deps
}
