use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::models::{Dependencies, Import, Module, ModuleType, Package, PackageId};

const PIPFILE_LOCK: &str = "Pipfile.lock";
const REQUIREMENTS: &str = "requirements.txt";
const PYPROJECT: &str = "pyproject.toml";

/// Analyzer for Python projects.
///
/// Searches for manifests in priority order:
/// `Pipfile.lock` (pinned) → `requirements.txt` → `pyproject.toml`.
/// Results are deduplicated by package name (case-insensitive). Python
/// manifests carry no edges, so every dependency is reported as direct.
pub struct PipAnalyzer {
    root: PathBuf,
}

impl PipAnalyzer {
    pub fn new(module: &Module) -> Result<Self> {
        Ok(Self {
            root: super::existing_dir(module)?,
        })
    }
}

#[async_trait]
impl super::Analyzer for PipAnalyzer {
    async fn is_built(&self) -> Result<bool> {
        Ok(self.root.join(PIPFILE_LOCK).exists() || self.root.join(REQUIREMENTS).exists())
    }

    async fn analyze(&self) -> Result<Dependencies> {
        let sources: [(&str, fn(&Path) -> Result<Vec<Import>>); 3] = [
            (PIPFILE_LOCK, parse_pipfile_lock),
            (REQUIREMENTS, parse_requirements_txt),
            (PYPROJECT, parse_pyproject_toml),
        ];

        let mut found = false;
        let mut seen: HashSet<String> = HashSet::new();
        let mut deps = Dependencies::default();

        for (file, parse) in sources {
            let path = self.root.join(file);
            if !path.exists() {
                continue;
            }
            found = true;
            for import in parse(&path)? {
                if seen.insert(import.resolved.name.to_lowercase()) {
                    let id = import.resolved.clone();
                    deps.transitive.insert(id.clone(), Package::leaf(id));
                    deps.direct.push(import);
                }
            }
        }

        if !found {
            bail!(
                "no {}, {} or {} found in {}",
                PIPFILE_LOCK,
                REQUIREMENTS,
                PYPROJECT,
                self.root.display()
            );
        }
        Ok(deps)
    }
}

fn make_import(target: &str, name: &str, version: &str) -> Import {
    Import::new(target, PackageId::new(ModuleType::Pip, name, version))
}

/// Parse `requirements.txt`: only `name==version` pins are resolvable.
fn parse_requirements_txt(path: &Path) -> Result<Vec<Import>> {
    let content = super::read_manifest(path)?;
    let re = Regex::new(r"^([A-Za-z0-9_\-\.]+)(?:\[[^\]]*\])?\s*==\s*([^\s;]+)")?;
    let mut imports = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
            continue;
        }
        if let Some(caps) = re.captures(line) {
            imports.push(make_import(line, &caps[1], &caps[2]));
        }
    }

    Ok(imports)
}

/// Parse `Pipfile.lock`: JSON with a `default` section.
fn parse_pipfile_lock(path: &Path) -> Result<Vec<Import>> {
    let content = super::read_manifest(path)?;
    let json: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("could not parse {}", path.display()))?;
    let mut imports = Vec::new();

    if let Some(pkgs) = json.get("default").and_then(|v| v.as_object()) {
        for (name, info) in pkgs {
            let pinned = info.get("version").and_then(|v| v.as_str()).unwrap_or("*");
            let version = pinned.trim_start_matches("==");
            imports.push(make_import(&format!("{}{}", name, pinned), name, version));
        }
    }

    Ok(imports)
}

#[derive(Debug, Deserialize)]
struct Pyproject {
    project: Option<PyprojectProject>,
}

#[derive(Debug, Deserialize)]
struct PyprojectProject {
    #[serde(default)]
    dependencies: Vec<String>,
}

/// Parse `pyproject.toml`: extract `[project].dependencies`.
fn parse_pyproject_toml(path: &Path) -> Result<Vec<Import>> {
    let content = super::read_manifest(path)?;
    let pyproject: Pyproject = toml::from_str(&content)
        .with_context(|| format!("could not parse {}", path.display()))?;

    let re = Regex::new(r"^([A-Za-z0-9_\-\.]+)\s*(?:==\s*([^\s;,\[]+))?")?;
    let mut imports = Vec::new();

    if let Some(project) = pyproject.project {
        for spec in &project.dependencies {
            if let Some(caps) = re.captures(spec) {
                let version = caps.get(2).map(|m| m.as_str()).unwrap_or("*");
                imports.push(make_import(spec, &caps[1], version));
            }
        }
    }

    Ok(imports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Analyzer;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_requirements_txt() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "# comment").unwrap();
        writeln!(f, "requests==2.28.1").unwrap();
        writeln!(f, "flask>=2.0.0").unwrap();
        writeln!(f, "uvicorn[standard]==0.22.0").unwrap();
        writeln!(f, "numpy==1.24.0 ; python_version >= '3.8'").unwrap();

        let imports = parse_requirements_txt(f.path()).unwrap();
        assert_eq!(imports.len(), 3);
        assert_eq!(imports[0].resolved.name, "requests");
        assert_eq!(imports[0].resolved.revision, "2.28.1");
        assert_eq!(imports[1].resolved.name, "uvicorn");
        assert_eq!(imports[2].resolved.name, "numpy");
    }

    #[tokio::test]
    async fn test_pipfile_lock_wins_over_requirements() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(PIPFILE_LOCK),
            r#"{ "default": { "requests": { "version": "==2.31.0" } }, "develop": {} }"#,
        )
        .unwrap();
        std::fs::write(dir.path().join(REQUIREMENTS), "Requests==2.0.0\nflask==3.0.0\n").unwrap();

        let module = Module::new("svc", ModuleType::Pip, dir.path().to_string_lossy());
        let analyzer = PipAnalyzer::new(&module).unwrap();
        assert!(analyzer.is_built().await.unwrap());

        let deps = analyzer.analyze().await.unwrap();
        let pinned: Vec<_> = deps
            .direct
            .iter()
            .map(|i| (i.resolved.name.as_str(), i.resolved.revision.as_str()))
            .collect();
        assert_eq!(pinned, vec![("requests", "2.31.0"), ("flask", "3.0.0")]);
        assert!(deps.transitive.values().all(|p| p.deps.is_empty()));
    }

    #[tokio::test]
    async fn test_no_manifest_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let module = Module::new("svc", ModuleType::Pip, dir.path().to_string_lossy());
        let analyzer = PipAnalyzer::new(&module).unwrap();
        assert!(analyzer.analyze().await.is_err());
    }
}
