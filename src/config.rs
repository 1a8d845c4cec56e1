use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::api::UploadOptions;
use crate::cli::Cli;
use crate::detector::detect_modules;
use crate::error::LocatorError;
use crate::locator::Locator;
use crate::models::{Module, ModuleType};

pub const DEFAULT_ENDPOINT: &str = "https://app.depsync.dev";
pub const DEFAULT_FETCHER: &str = "custom";

/// Root configuration structure, deserialized from `.depsync/config.toml`.
/// Every section is optional.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub project: ProjectConfig,
    pub analyze: AnalyzeConfig,
    pub modules: Vec<ModuleConfig>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub endpoint: Option<String>,
    pub key: Option<String>,
}

/// Metadata of the uploaded build.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectConfig {
    pub title: Option<String>,
    pub fetcher: Option<String>,
    pub name: Option<String>,
    pub revision: Option<String>,
    pub branch: Option<String>,
    pub url: Option<String>,
    pub jira_project_key: Option<String>,
    pub link: Option<String>,
    pub team: Option<String>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalyzeConfig {
    /// Modules analyzed in parallel. Defaults to 1.
    pub concurrency: Option<usize>,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct ModuleConfig {
    /// Defaults to the last component of `target`.
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub ty: ModuleType,
    /// Relative to the project directory.
    pub target: String,
}

/// Load the configuration, searching in order:
///
/// 1. `config_override`: path passed via `--config`
/// 2. `<project_path>/.depsync/config.toml`
/// 3. `~/.config/depsync/config.toml`
/// 4. Built-in [`Config::default`]
pub fn load_config(project_path: &Path, config_override: Option<&Path>) -> Result<Config> {
    if let Some(path) = config_override {
        return read_config(path);
    }

    let project_config = project_path.join(".depsync").join("config.toml");
    if project_config.exists() {
        return read_config(&project_config);
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".config").join("depsync").join("config.toml");
        if home_config.exists() {
            return read_config(&home_config);
        }
    }

    Ok(Config::default())
}

fn read_config(path: &Path) -> Result<Config> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("could not read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("invalid config file {}", path.display()))
}

/// Everything a run needs, with CLI values taking precedence over the
/// config file and defaults filled in.
#[derive(Debug)]
pub struct Settings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub title: String,
    pub fetcher: String,
    pub project: String,
    pub revision: String,
    pub options: UploadOptions,
    pub concurrency: usize,
    pub modules: Vec<Module>,
}

impl Settings {
    pub fn resolve(cli: &Cli, config: Config) -> Result<Self> {
        let project_dir = cli.path.as_path();
        let Config {
            api,
            project,
            analyze,
            modules: configured,
        } = config;

        let modules = if !cli.modules.is_empty() {
            cli.modules
                .iter()
                .map(|spec| {
                    let (ty, target) = parse_module_spec(spec)?;
                    Ok(module_at(project_dir, None, ty, &target))
                })
                .collect::<Result<Vec<_>>>()?
        } else if !configured.is_empty() {
            configured
                .into_iter()
                .map(|m| module_at(project_dir, m.name, m.ty, &m.target))
                .collect()
        } else {
            detect_modules(project_dir)
        };

        let project_name = pick(&cli.project, project.name).unwrap_or_else(|| dir_name(project_dir));
        let title = pick(&cli.title, project.title).unwrap_or_else(|| project_name.clone());

        Ok(Settings {
            endpoint: pick(&cli.endpoint, api.endpoint).unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key: pick(&cli.api_key, api.key),
            title,
            fetcher: pick(&cli.fetcher, project.fetcher).unwrap_or_else(|| DEFAULT_FETCHER.to_string()),
            revision: pick(&cli.revision, project.revision).unwrap_or_else(timestamp_revision),
            project: project_name,
            options: UploadOptions {
                branch: pick(&cli.branch, project.branch),
                project_url: pick(&cli.project_url, project.url),
                jira_project_key: pick(&cli.jira_project_key, project.jira_project_key),
                link: pick(&cli.link, project.link),
                team: pick(&cli.team, project.team),
            },
            concurrency: cli.jobs.or(analyze.concurrency).unwrap_or(1).max(1),
            modules,
        })
    }

    /// Locator the whole build is uploaded under.
    pub fn project_locator(&self) -> Result<Locator, LocatorError> {
        Locator::new(&*self.fetcher, &*self.project, &*self.revision)
    }
}

/// Parse a `type:target` module argument.
pub fn parse_module_spec(spec: &str) -> Result<(ModuleType, String)> {
    let Some((ty, target)) = spec.split_once(':') else {
        bail!("module `{}` must be written as `type:target`", spec);
    };
    if target.trim().is_empty() {
        bail!("module `{}` has an empty target", spec);
    }
    let ty = ty.parse::<ModuleType>().map_err(anyhow::Error::msg)?;
    Ok((ty, target.trim().to_string()))
}

fn module_at(project_dir: &Path, name: Option<String>, ty: ModuleType, target: &str) -> Module {
    let path = project_dir.join(target);
    let name = name.unwrap_or_else(|| dir_name(&path));
    Module::new(name, ty, path.to_string_lossy())
}

/// CLI value if set and non-blank, else the file value if non-blank.
fn pick(cli: &Option<String>, file: Option<String>) -> Option<String> {
    let present = |v: &String| !v.trim().is_empty();
    cli.clone().filter(present).or_else(|| file.filter(present))
}

/// Last component of `path`, resolving `.` and `..` when the path exists.
fn dir_name(path: &Path) -> String {
    path.canonicalize()
        .ok()
        .as_deref()
        .unwrap_or(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string())
}

fn timestamp_revision() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FULL: &str = r#"
[api]
endpoint = "https://depsync.internal.example"
key = "from-file"

[project]
title = "Storefront"
name = "github.com/acme/store"
branch = "develop"
team = "web"

[analyze]
concurrency = 3

[[modules]]
name = "frontend"
type = "npm"
target = "web"

[[modules]]
type = "raw"
target = "third_party/zlib"
"#;

    fn cli(args: &[&str]) -> Cli {
        use clap::Parser;
        let mut argv = vec!["depsync"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(FULL).unwrap();
        assert_eq!(config.api.key.as_deref(), Some("from-file"));
        assert_eq!(config.analyze.concurrency, Some(3));
        assert_eq!(
            config.modules,
            vec![
                ModuleConfig {
                    name: Some("frontend".to_string()),
                    ty: ModuleType::Npm,
                    target: "web".to_string(),
                },
                ModuleConfig {
                    name: None,
                    ty: ModuleType::Raw,
                    target: "third_party/zlib".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(toml::from_str::<Config>("").unwrap(), Config::default());
    }

    #[test]
    fn test_unknown_module_type_is_rejected() {
        let bad = "[[modules]]\ntype = \"bower\"\ntarget = \".\"\n";
        assert!(toml::from_str::<Config>(bad).is_err());
    }

    #[test]
    fn test_load_config_prefers_project_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".depsync")).unwrap();
        std::fs::write(dir.path().join(".depsync/config.toml"), FULL).unwrap();

        let config = load_config(dir.path(), None).unwrap();
        assert_eq!(config.project.title.as_deref(), Some("Storefront"));
    }

    #[test]
    fn test_load_config_override_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = load_config(dir.path(), Some(&missing)).unwrap_err();
        assert!(format!("{:#}", err).contains("nope.toml"));
    }

    #[test]
    fn test_cli_overrides_file() {
        let config: Config = toml::from_str(FULL).unwrap();
        let cli = cli(&[
            "--path",
            "/srv/store",
            "--api-key",
            "from-cli",
            "--branch",
            "main",
            "-j",
            "8",
            "--revision",
            "abc123",
        ]);

        let settings = Settings::resolve(&cli, config).unwrap();

        assert_eq!(settings.api_key.as_deref(), Some("from-cli"));
        assert_eq!(settings.endpoint, "https://depsync.internal.example");
        assert_eq!(settings.options.branch.as_deref(), Some("main"));
        assert_eq!(settings.options.team.as_deref(), Some("web"));
        assert_eq!(settings.concurrency, 8);
        assert_eq!(settings.title, "Storefront");
        assert_eq!(
            settings.project_locator().unwrap().to_string(),
            "custom+github.com/acme/store$abc123"
        );

        let modules: Vec<_> = settings
            .modules
            .iter()
            .map(|m| (m.name.as_str(), m.ty, m.build_target.as_str()))
            .collect();
        assert_eq!(
            modules,
            vec![
                ("frontend", ModuleType::Npm, "/srv/store/web"),
                ("zlib", ModuleType::Raw, "/srv/store/third_party/zlib"),
            ]
        );
    }

    #[test]
    fn test_cli_modules_replace_configured_ones() {
        let config: Config = toml::from_str(FULL).unwrap();
        let settings = Settings::resolve(&cli(&["--path", "/srv/store", "raw:vendor"]), config).unwrap();
        assert_eq!(settings.modules.len(), 1);
        assert_eq!(settings.modules[0].name, "vendor");
        assert_eq!(settings.modules[0].ty, ModuleType::Raw);
    }

    #[test]
    fn test_defaults_without_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop");
        std::fs::create_dir_all(&path).unwrap();
        let cli = cli(&["--path", path.to_str().unwrap(), "--endpoint", "", "--api-key", ""]);

        let settings = Settings::resolve(&cli, Config::default()).unwrap();

        assert_eq!(settings.project, "shop");
        assert_eq!(settings.title, "shop");
        assert_eq!(settings.fetcher, DEFAULT_FETCHER);
        assert_eq!(settings.endpoint, DEFAULT_ENDPOINT);
        assert!(settings.api_key.is_none());
        assert_eq!(settings.concurrency, 1);
        assert!(settings.revision.parse::<u64>().is_ok());
        assert!(settings.modules.is_empty());
    }

    #[test]
    fn test_parse_module_spec() {
        assert_eq!(
            parse_module_spec("npm:./web").unwrap(),
            (ModuleType::Npm, "./web".to_string())
        );
        assert!(parse_module_spec("./web").is_err());
        assert!(parse_module_spec("npm:").is_err());
        assert!(parse_module_spec("bower:./web").is_err());
    }
}
