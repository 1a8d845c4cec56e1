use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Ecosystem tag of a module or package.
///
/// New ecosystems are added here and registered with the
/// [`AnalyzerRegistry`](crate::analyzer::AnalyzerRegistry); the orchestrator
/// never matches on individual variants except [`ModuleType::Raw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    /// Plain source directory with no package manager; uploaded as an archive.
    Raw,
    Cargo,
    Npm,
    Pip,
    Maven,
    Gradle,
    Go,
    Gem,
    Composer,
    Nuget,
}

impl ModuleType {
    pub const ALL: [ModuleType; 10] = [
        ModuleType::Raw,
        ModuleType::Cargo,
        ModuleType::Npm,
        ModuleType::Pip,
        ModuleType::Maven,
        ModuleType::Gradle,
        ModuleType::Go,
        ModuleType::Gem,
        ModuleType::Composer,
        ModuleType::Nuget,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleType::Raw => "raw",
            ModuleType::Cargo => "cargo",
            ModuleType::Npm => "npm",
            ModuleType::Pip => "pip",
            ModuleType::Maven => "maven",
            ModuleType::Gradle => "gradle",
            ModuleType::Go => "go",
            ModuleType::Gem => "gem",
            ModuleType::Composer => "composer",
            ModuleType::Nuget => "nuget",
        }
    }

    /// Fetcher name used by the remote service for packages of this type.
    pub fn fetcher(&self) -> &'static str {
        match self {
            ModuleType::Raw => "custom",
            ModuleType::Cargo => "cargo",
            ModuleType::Npm => "npm",
            ModuleType::Pip => "pip",
            ModuleType::Maven | ModuleType::Gradle => "mvn",
            ModuleType::Go => "go",
            ModuleType::Gem => "gem",
            ModuleType::Composer => "comp",
            ModuleType::Nuget => "nuget",
        }
    }
}

impl std::fmt::Display for ModuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        ModuleType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| format!("unknown module type `{}`", s))
    }
}

/// Identity of a resolved dependency. Two ids are equal iff all fields match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageId {
    #[serde(rename = "type")]
    pub ty: ModuleType,
    pub name: String,
    pub revision: String,
}

impl PackageId {
    pub fn new(ty: ModuleType, name: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            ty,
            name: name.into(),
            revision: revision.into(),
        }
    }
}

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}@{}", self.ty, self.name, self.revision)
    }
}

/// Edge from a module (or package) to a resolved dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    /// Reference as written in the manifest, kept for diagnostics.
    pub target: String,
    pub resolved: PackageId,
}

impl Import {
    pub fn new(target: impl Into<String>, resolved: PackageId) -> Self {
        Self {
            target: target.into(),
            resolved,
        }
    }
}

/// Graph node: a package and the packages it depends on directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub deps: BTreeSet<PackageId>,
}

impl Package {
    pub fn leaf(id: PackageId) -> Self {
        Self {
            id,
            deps: BTreeSet::new(),
        }
    }
}

/// Transitive dependency graph keyed by package identity. May contain cycles.
pub type DependencyGraph = HashMap<PackageId, Package>;

/// What an analyzer reports for one module.
#[derive(Debug, Clone, Default)]
pub struct Dependencies {
    pub direct: Vec<Import>,
    pub transitive: DependencyGraph,
    /// Version of the module itself, when the analyzer can tell.
    pub revision: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Pending,
    Analyzed,
    Unanalyzed,
}

impl std::fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleStatus::Pending => write!(f, "pending"),
            ModuleStatus::Analyzed => write!(f, "analyzed"),
            ModuleStatus::Unanalyzed => write!(f, "unanalyzed"),
        }
    }
}

/// One unit of analysis input, plus the results attached to it.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub ty: ModuleType,
    pub build_target: String,
    pub revision: Option<String>,
    pub imports: Vec<Import>,
    pub deps: DependencyGraph,
    pub status: ModuleStatus,
}

impl Module {
    pub fn new(name: impl Into<String>, ty: ModuleType, build_target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty,
            build_target: build_target.into(),
            revision: None,
            imports: Vec::new(),
            deps: DependencyGraph::new(),
            status: ModuleStatus::Pending,
        }
    }

    /// Directory the analyzers should look in. A target naming a manifest
    /// file resolves to the file's parent directory.
    pub fn target_dir(&self) -> PathBuf {
        let path = Path::new(&self.build_target);
        if path.is_file() {
            path.parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        } else {
            path.to_path_buf()
        }
    }

    pub fn attach(&mut self, deps: Dependencies) {
        self.imports = deps.direct;
        self.deps = deps.transitive;
        if deps.revision.is_some() {
            self.revision = deps.revision;
        }
        self.status = ModuleStatus::Analyzed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_module_type_parse() {
        assert_eq!("npm".parse::<ModuleType>().unwrap(), ModuleType::Npm);
        assert_eq!(" Cargo ".parse::<ModuleType>().unwrap(), ModuleType::Cargo);
        assert!("bower".parse::<ModuleType>().is_err());
        for ty in ModuleType::ALL {
            assert_eq!(ty.to_string().parse::<ModuleType>().unwrap(), ty);
        }
    }

    #[test]
    fn test_package_id_equality_needs_all_fields() {
        let a = PackageId::new(ModuleType::Npm, "left-pad", "1.0.0");
        let b = PackageId::new(ModuleType::Npm, "left-pad", "1.0.0");
        let c = PackageId::new(ModuleType::Npm, "left-pad", "1.0.1");
        let d = PackageId::new(ModuleType::Cargo, "left-pad", "1.0.0");

        let set: HashSet<_> = [a.clone(), b, c, d].into_iter().collect();
        assert_eq!(set.len(), 3);
        assert!(set.contains(&a));
    }

    #[test]
    fn test_graph_tolerates_cycles() {
        let a = PackageId::new(ModuleType::Npm, "a", "1");
        let b = PackageId::new(ModuleType::Npm, "b", "1");
        let mut graph = DependencyGraph::new();
        graph.insert(
            a.clone(),
            Package {
                id: a.clone(),
                deps: [b.clone()].into_iter().collect(),
            },
        );
        graph.insert(
            b.clone(),
            Package {
                id: b.clone(),
                deps: [a.clone()].into_iter().collect(),
            },
        );
        assert!(graph[&a].deps.contains(&b));
        assert!(graph[&b].deps.contains(&a));
    }

    #[test]
    fn test_attach_keeps_configured_revision_when_analyzer_has_none() {
        let mut module = Module::new("app", ModuleType::Pip, ".");
        module.revision = Some("2.0".to_string());
        module.attach(Dependencies::default());
        assert_eq!(module.revision.as_deref(), Some("2.0"));
        assert_eq!(module.status, ModuleStatus::Analyzed);
    }
}
