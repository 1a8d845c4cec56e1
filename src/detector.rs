use std::path::Path;

use tracing::debug;

use crate::models::{Module, ModuleType};

/// Manifest files that mark a directory as a module of the given type.
/// The first matching entry wins, so a directory yields at most one module.
const MANIFESTS: &[(ModuleType, &[&str])] = &[
    (ModuleType::Cargo, &["Cargo.toml", "Cargo.lock"]),
    (ModuleType::Npm, &["package.json", "package-lock.json"]),
    (
        ModuleType::Pip,
        &["requirements.txt", "Pipfile.lock", "pyproject.toml"],
    ),
    (ModuleType::Maven, &["pom.xml"]),
    (ModuleType::Gradle, &["build.gradle", "build.gradle.kts"]),
    (ModuleType::Go, &["go.mod"]),
    (ModuleType::Gem, &["Gemfile", "Gemfile.lock"]),
    (ModuleType::Composer, &["composer.json"]),
    (ModuleType::Nuget, &["packages.config"]),
];

/// Directories never searched for modules.
const SKIPPED_DIRS: &[&str] = &["node_modules", "target", "build", "vendor", "dist"];

/// Auto-detect modules in `path` and its immediate subdirectories by
/// scanning for known manifest files.
pub fn detect_modules(path: &Path) -> Vec<Module> {
    let mut modules = Vec::new();
    let root_name = path
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "root".to_string());

    if let Some(ty) = detect_type(path) {
        modules.push(Module::new(root_name, ty, path.to_string_lossy()));
    }

    let mut children: Vec<_> = match std::fs::read_dir(path) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect(),
        Err(err) => {
            debug!(path = %path.display(), "cannot list directory: {}", err);
            return modules;
        }
    };
    children.sort();

    for child in children {
        let Some(name) = child.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_str()) {
            continue;
        }
        if let Some(ty) = detect_type(&child) {
            modules.push(Module::new(name, ty, child.to_string_lossy()));
        }
    }

    for module in &modules {
        debug!(module = %module.name, ty = %module.ty, target = %module.build_target, "detected module");
    }
    modules
}

fn detect_type(dir: &Path) -> Option<ModuleType> {
    for (ty, files) in MANIFESTS {
        if files.iter().any(|f| dir.join(f).exists()) {
            return Some(*ty);
        }
    }
    if has_csproj(dir) {
        return Some(ModuleType::Nuget);
    }
    None
}

fn has_csproj(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .any(|e| e.path().extension().is_some_and(|ext| ext == "csproj"))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_detects_root_and_subdirectory_modules() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("Cargo.toml"));
        touch(&root.join("web/package.json"));
        touch(&root.join("api/pom.xml"));
        touch(&root.join("svc/go.mod"));
        touch(&root.join("tools/App.csproj"));
        touch(&root.join("node_modules/left-pad/package.json"));
        touch(&root.join(".cache/requirements.txt"));
        fs::create_dir_all(root.join("docs")).unwrap();

        let found: Vec<_> = detect_modules(root)
            .into_iter()
            .map(|m| (m.name, m.ty))
            .collect();

        let root_name = root
            .canonicalize()
            .unwrap()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert_eq!(
            found,
            vec![
                (root_name, ModuleType::Cargo),
                ("api".to_string(), ModuleType::Maven),
                ("svc".to_string(), ModuleType::Go),
                ("tools".to_string(), ModuleType::Nuget),
                ("web".to_string(), ModuleType::Npm),
            ]
        );
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(detect_modules(dir.path()).is_empty());
    }

    #[test]
    fn test_first_manifest_type_wins() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("pyproject.toml"));
        touch(&dir.path().join("package.json"));
        assert_eq!(detect_type(dir.path()), Some(ModuleType::Npm));
    }
}
