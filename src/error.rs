use std::path::PathBuf;

use colored::Colorize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocatorError {
    #[error("locator {field} must not be empty")]
    Empty { field: &'static str },

    #[error("locator {field} `{value}` contains reserved separator `{separator}`")]
    ReservedSeparator {
        field: &'static str,
        value: String,
        separator: char,
    },

    #[error("malformed locator `{0}`, expected `fetcher+project$revision`")]
    Malformed(String),
}

/// Failures that abort an analysis run.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("module `{module}`: {source:#}")]
    Analyze {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("cancelled after analyzing {analyzed} of {total} modules")]
    Cancelled { analyzed: usize, total: usize },
}

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("module with build target `{target}` has no name")]
    UnnamedModule { target: String },

    #[error("module `{module}` cannot be addressed: {source}")]
    InvalidLocator {
        module: String,
        #[source]
        source: LocatorError,
    },
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("no API key configured")]
    MissingApiKey,

    #[error("invalid endpoint `{0}`")]
    Endpoint(String),

    #[error("request to {url} failed: {}", causes(source))]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with {status}: {body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("could not package `{}`: {}", path.display(), causes(source))]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("service returned an unusable locator")]
    Locator(#[from] LocatorError),
}

/// An error followed by each of its causes, joined with `: `. Used where
/// the cause carries the actionable detail (DNS, TLS, permissions).
fn causes(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut next = err.source();
    while let Some(cause) = next {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        next = cause.source();
    }
    text
}

/// Top-level failure of a `depsync` invocation.
///
/// The variants keep the three failure domains apart: configuration problems
/// found before any work starts, analysis failures, and publish failures.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("An API key is needed to upload analysis results.")]
    MissingApiKey { endpoint: String },

    #[error("No modules specified.")]
    NoModules,

    #[error("could not load configuration: {0:#}")]
    Config(anyhow::Error),

    #[error("could not analyze: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("could not normalize output: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("could not render output: {0:#}")]
    Output(anyhow::Error),

    #[error("error during upload: {0}")]
    Upload(#[from] UploadError),
}

impl AppError {
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Analysis(_) | AppError::Normalize(_) | AppError::Output(_) => 1,
            AppError::MissingApiKey { .. } | AppError::NoModules | AppError::Config(_) => 2,
            AppError::Upload(_) => 3,
        }
    }

    /// Remediation text printed after the error message, if any.
    pub fn troubleshooting(&self) -> Option<String> {
        match self {
            AppError::MissingApiKey { endpoint } => Some(format!(
                "Running `depsync` analyzes dependencies and uploads the result. \
                 To run an analysis without uploading results, run:\n\n    {}\n\n\
                 You can provide your API key by setting the $DEPSYNC_API_KEY \
                 environment variable. For example:\n\n    {}\n\n\
                 You can create an API key at:\n\n    {}\n",
                "depsync --output".bright_green(),
                "DEPSYNC_API_KEY=<YOUR_API_KEY_HERE> depsync".bright_green(),
                format!(
                    "{}/account/settings/integrations/api_tokens",
                    endpoint.trim_end_matches('/')
                )
                .bright_blue(),
            )),
            AppError::NoModules => Some(
                "Pass modules as `type:path` arguments (e.g. `depsync npm:./web`) \
                 or list them under [[modules]] in .depsync/config.toml."
                    .to_string(),
            ),
            _ => None,
        }
    }
}
