//! Ecosystem analyzers and the registry that binds them to modules.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use crate::models::{Dependencies, Module, ModuleType};

pub mod dotnet;
pub mod java;
pub mod node;
pub mod python;
pub mod rust;

/// Dependency discovery for one module, bound at construction.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Best-effort check for build artifacts. Callers treat failure as advisory.
    async fn is_built(&self) -> Result<bool>;

    async fn analyze(&self) -> Result<Dependencies>;
}

pub type Constructor = Arc<dyn Fn(&Module) -> Result<Box<dyn Analyzer>> + Send + Sync>;

/// Maps module types to analyzer constructors.
#[derive(Clone, Default)]
pub struct AnalyzerRegistry {
    constructors: HashMap<ModuleType, Constructor>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the bundled lockfile analyzers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ModuleType::Cargo, |m| {
            Ok(Box::new(rust::CargoAnalyzer::new(m)?) as Box<dyn Analyzer>)
        });
        registry.register(ModuleType::Npm, |m| {
            Ok(Box::new(node::NpmAnalyzer::new(m)?) as Box<dyn Analyzer>)
        });
        registry.register(ModuleType::Pip, |m| {
            Ok(Box::new(python::PipAnalyzer::new(m)?) as Box<dyn Analyzer>)
        });
        registry.register(ModuleType::Maven, |m| {
            Ok(Box::new(java::MavenAnalyzer::new(m)?) as Box<dyn Analyzer>)
        });
        registry.register(ModuleType::Gradle, |m| {
            Ok(Box::new(java::GradleAnalyzer::new(m)?) as Box<dyn Analyzer>)
        });
        registry.register(ModuleType::Nuget, |m| {
            Ok(Box::new(dotnet::NugetAnalyzer::new(m)?) as Box<dyn Analyzer>)
        });
        registry
    }

    /// Register (or replace) the constructor for `ty`.
    pub fn register<F>(&mut self, ty: ModuleType, constructor: F)
    where
        F: Fn(&Module) -> Result<Box<dyn Analyzer>> + Send + Sync + 'static,
    {
        self.constructors.insert(ty, Arc::new(constructor));
    }

    /// Bind an analyzer to `module`.
    pub fn resolve(&self, module: &Module) -> Result<Box<dyn Analyzer>> {
        match self.constructors.get(&module.ty) {
            Some(constructor) => constructor(module),
            None => bail!("no analyzer available for `{}` modules", module.ty),
        }
    }
}

/// Shared constructor check: the module's target directory must exist.
pub(crate) fn existing_dir(module: &Module) -> Result<PathBuf> {
    let dir = module.target_dir();
    if !dir.is_dir() {
        bail!(
            "build target `{}` of module `{}` is not a directory",
            dir.display(),
            module.name
        );
    }
    Ok(dir)
}

/// Read a manifest, naming the file in the error.
pub(crate) fn read_manifest(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("could not read {}", path.display()))
}
