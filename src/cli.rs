use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "depsync",
    about = "Analyze project modules across package managers and publish the dependency graph",
    version
)]
pub struct Cli {
    /// Modules to analyze as `type:target`, e.g. `npm:./web` or `raw:./vendor`.
    /// Overrides modules from the config file; detected from manifests when absent.
    #[arg(value_name = "MODULE")]
    pub modules: Vec<String>,

    /// Project directory
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Config file [default: ./.depsync/config.toml, fallback ~/.config/depsync/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write results locally instead of uploading; `-` for stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Format of local output
    #[arg(long, default_value = "json", value_name = "FORMAT")]
    pub format: ReportFormat,

    /// API key for uploads
    #[arg(long, env = "DEPSYNC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Analysis service base URL
    #[arg(long, env = "DEPSYNC_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Human-readable project title
    #[arg(long)]
    pub title: Option<String>,

    /// Fetcher of the project locator
    #[arg(long)]
    pub fetcher: Option<String>,

    /// Project name [default: project directory name]
    #[arg(long)]
    pub project: Option<String>,

    /// Project revision [default: current unix time]
    #[arg(long)]
    pub revision: Option<String>,

    #[arg(long)]
    pub branch: Option<String>,

    #[arg(long)]
    pub project_url: Option<String>,

    #[arg(long)]
    pub jira_project_key: Option<String>,

    #[arg(long)]
    pub link: Option<String>,

    #[arg(long)]
    pub team: Option<String>,

    /// Modules analyzed in parallel
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Errors only, no progress bar
    #[arg(short, long)]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error); overrides -v/-q
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Json,
    Terminal,
}
