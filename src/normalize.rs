//! Conversion of analyzed modules into source units, the wire format the
//! analysis service ingests.
//!
//! Output depends only on the input modules: graph nodes are listed in
//! [`PackageId`] order and every node's edges come from an ordered set, so the
//! same modules always serialize to the same bytes.

use serde::Serialize;

use crate::error::{LocatorError, NormalizeError};
use crate::locator::Locator;
use crate::models::{Module, ModuleStatus, ModuleType, PackageId};

const DEFAULT_ARTIFACT: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SourceUnit {
    pub name: String,
    #[serde(rename = "Type")]
    pub ty: String,
    pub manifest: String,
    pub locator: String,
    pub build: Build,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Build {
    pub artifact: String,
    pub succeeded: bool,
    pub imports: Vec<String>,
    pub dependencies: Vec<SourceDependency>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SourceDependency {
    pub locator: String,
    pub imports: Vec<String>,
}

/// Normalize every module. Any module that cannot be addressed fails the
/// whole batch.
pub fn normalize(modules: &[Module]) -> Result<Vec<SourceUnit>, NormalizeError> {
    modules.iter().map(normalize_module).collect()
}

fn normalize_module(module: &Module) -> Result<SourceUnit, NormalizeError> {
    if module.name.trim().is_empty() {
        return Err(NormalizeError::UnnamedModule {
            target: module.build_target.clone(),
        });
    }
    let invalid = |source: LocatorError| NormalizeError::InvalidLocator {
        module: module.name.clone(),
        source,
    };
    let text = |id: &PackageId| Locator::of(id).map(|l| l.to_string()).map_err(invalid);

    let locator = module_locator(module).map_err(invalid)?;

    let imports = module
        .imports
        .iter()
        .map(|import| text(&import.resolved))
        .collect::<Result<Vec<_>, NormalizeError>>()?;

    let mut packages: Vec<_> = module.deps.values().collect();
    packages.sort_by(|a, b| a.id.cmp(&b.id));
    let dependencies = packages
        .into_iter()
        .map(|package| -> Result<SourceDependency, NormalizeError> {
            Ok(SourceDependency {
                locator: text(&package.id)?,
                imports: package
                    .deps
                    .iter()
                    .map(text)
                    .collect::<Result<Vec<_>, NormalizeError>>()?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SourceUnit {
        name: module.name.clone(),
        ty: module.ty.to_string(),
        manifest: module.build_target.clone(),
        locator: locator.to_string(),
        build: Build {
            artifact: DEFAULT_ARTIFACT.to_string(),
            succeeded: module.status == ModuleStatus::Analyzed,
            imports,
            dependencies,
        },
    })
}

/// Raw modules are addressed by the content they resolved to; everything
/// else by its own name and revision.
fn module_locator(module: &Module) -> Result<Locator, LocatorError> {
    if module.ty == ModuleType::Raw {
        if let Some(import) = module.imports.first() {
            return Locator::of(&import.resolved);
        }
    }
    Locator::new(
        module.ty.fetcher(),
        module.name.clone(),
        module.revision.clone().unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::models::{DependencyGraph, Import, Package};

    fn npm(name: &str, version: &str) -> PackageId {
        PackageId::new(ModuleType::Npm, name, version)
    }

    fn web_module(order: &[usize]) -> Module {
        let express = npm("express", "4.18.2");
        let body = npm("body-parser", "1.20.1");
        let bytes = npm("bytes", "3.1.2");
        let nodes = [
            Package {
                id: express.clone(),
                deps: [body.clone(), bytes.clone()].into_iter().collect(),
            },
            Package {
                id: body.clone(),
                deps: [bytes.clone()].into_iter().collect(),
            },
            Package::leaf(bytes),
        ];

        let mut graph = DependencyGraph::new();
        for &i in order {
            graph.insert(nodes[i].id.clone(), nodes[i].clone());
        }

        let mut module = Module::new("web", ModuleType::Npm, "./web");
        module.imports = vec![Import::new("express", express)];
        module.deps = graph;
        module.revision = Some("1.0.0".to_string());
        module.status = ModuleStatus::Analyzed;
        module
    }

    #[test]
    fn test_npm_module_wire_format() {
        let units = normalize(&[web_module(&[0, 1, 2])]).unwrap();
        let value = serde_json::to_value(&units).unwrap();

        assert_eq!(
            value,
            json!([{
                "Name": "web",
                "Type": "npm",
                "Manifest": "./web",
                "Locator": "npm+web$1.0.0",
                "Build": {
                    "Artifact": "default",
                    "Succeeded": true,
                    "Imports": ["npm+express$4.18.2"],
                    "Dependencies": [
                        {
                            "Locator": "npm+body-parser$1.20.1",
                            "Imports": ["npm+bytes$3.1.2"]
                        },
                        {
                            "Locator": "npm+bytes$3.1.2",
                            "Imports": []
                        },
                        {
                            "Locator": "npm+express$4.18.2",
                            "Imports": ["npm+body-parser$1.20.1", "npm+bytes$3.1.2"]
                        }
                    ]
                }
            }])
        );
    }

    #[test]
    fn test_output_is_independent_of_graph_insertion_order() {
        let a = serde_json::to_string(&normalize(&[web_module(&[0, 1, 2])]).unwrap()).unwrap();
        let b = serde_json::to_string(&normalize(&[web_module(&[2, 0, 1])]).unwrap()).unwrap();
        let c = serde_json::to_string(&normalize(&[web_module(&[1, 2, 0])]).unwrap()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_raw_module_uses_resolved_identity() {
        let id = PackageId::new(ModuleType::Raw, "myproj", "abc123");
        let mut module = Module::new("vendor", ModuleType::Raw, "./vendor");
        module.imports = vec![Import::new("./vendor", id.clone())];
        module.deps = DependencyGraph::from([(id.clone(), Package::leaf(id))]);
        module.status = ModuleStatus::Analyzed;

        let unit = normalize(&[module]).unwrap().remove(0);

        assert_eq!(unit.locator, "custom+myproj$abc123");
        assert_eq!(unit.build.imports, vec!["custom+myproj$abc123"]);
        assert_eq!(
            unit.build.dependencies,
            vec![SourceDependency {
                locator: "custom+myproj$abc123".to_string(),
                imports: Vec::new(),
            }]
        );
    }

    #[test]
    fn test_cycles_are_listed_not_followed() {
        let a = PackageId::new(ModuleType::Cargo, "a", "1.0.0");
        let b = PackageId::new(ModuleType::Cargo, "b", "1.0.0");
        let mut module = Module::new("core", ModuleType::Cargo, ".");
        module.deps = DependencyGraph::from([
            (
                a.clone(),
                Package {
                    id: a.clone(),
                    deps: [b.clone()].into_iter().collect(),
                },
            ),
            (
                b.clone(),
                Package {
                    id: b.clone(),
                    deps: [a.clone()].into_iter().collect(),
                },
            ),
        ]);

        let unit = normalize(&[module]).unwrap().remove(0);
        assert_eq!(unit.build.dependencies.len(), 2);
        assert_eq!(unit.build.dependencies[0].imports, vec!["cargo+b$1.0.0"]);
        assert_eq!(unit.build.dependencies[1].imports, vec!["cargo+a$1.0.0"]);
    }

    #[test]
    fn test_unanalyzed_module_is_kept_without_revision() {
        let module = Module::new("svc", ModuleType::Go, "./svc");
        let unit = normalize(&[module]).unwrap().remove(0);
        assert_eq!(unit.locator, "go+svc$");
        assert!(!unit.build.succeeded);
        assert!(unit.build.imports.is_empty());
        assert!(unit.build.dependencies.is_empty());
    }

    #[test]
    fn test_maven_and_gradle_share_fetcher() {
        let modules = [
            Module::new("api", ModuleType::Maven, "./api"),
            Module::new("app", ModuleType::Gradle, "./app"),
        ];
        let units = normalize(&modules).unwrap();
        assert_eq!(units[0].locator, "mvn+api$");
        assert_eq!(units[1].locator, "mvn+app$");
        assert_eq!(units[1].ty, "gradle");
    }

    #[test]
    fn test_reserved_separator_fails_the_batch() {
        let good = Module::new("ok", ModuleType::Npm, ".");
        let mut bad = Module::new("bad", ModuleType::Npm, ".");
        bad.imports = vec![Import::new("weird", npm("we$ird", "1.0.0"))];

        let err = normalize(&[good, bad]).unwrap_err();
        match err {
            NormalizeError::InvalidLocator { module, source } => {
                assert_eq!(module, "bad");
                assert!(matches!(source, LocatorError::ReservedSeparator { separator: '$', .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unnamed_module() {
        let module = Module::new("", ModuleType::Pip, "./scripts");
        assert!(matches!(
            normalize(&[module]),
            Err(NormalizeError::UnnamedModule { target }) if target == "./scripts"
        ));
    }
}
