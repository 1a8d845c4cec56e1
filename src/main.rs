//! `depsync`: analyze the dependencies of every module in a project, whatever
//! its package manager, and publish the normalized graph.
//!
//! # Flow
//! 1. Parse CLI arguments ([`cli`]) and initialize logging.
//! 2. Load config ([`config::load_config`]) and resolve settings, detecting
//!    modules from manifests when none are given ([`detector`]).
//! 3. Analyze every module ([`orchestrator`]); raw modules are uploaded as
//!    archives instead ([`raw`]).
//! 4. Normalize results into source units ([`normalize`]).
//! 5. Write them locally (`--output`, [`report`]) or upload them ([`api`]).
//! 6. Exit `0`, or the failure's exit code ([`error::AppError::exit_code`]).

mod analyzer;
mod api;
mod cli;
mod config;
mod detector;
mod error;
mod locator;
mod models;
mod normalize;
mod orchestrator;
mod progress;
mod raw;
mod report;

use std::env;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use analyzer::AnalyzerRegistry;
use api::ApiClient;
use cli::Cli;
use config::{load_config, Settings};
use error::AppError;
use locator::Locator;
use normalize::normalize;
use orchestrator::Orchestrator;
use progress::{ProgressSink, SilentProgress, TerminalProgress};

/// Exit code after a second Ctrl-C, as shells report for SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Where results go once analyzed.
enum Destination {
    Local(PathBuf),
    Upload(Locator),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging_from_args(&cli);
    debug!("depsync v{} starting", env!("CARGO_PKG_VERSION"));

    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            if let Some(help) = err.troubleshooting() {
                eprintln!("\n{}", help);
            }
            err.exit_code()
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let path = cli.path.canonicalize().unwrap_or_else(|_| cli.path.clone());
    let config = load_config(&path, cli.config.as_deref()).map_err(AppError::Config)?;
    let cli = Cli { path, ..cli };
    let mut settings = Settings::resolve(&cli, config).map_err(AppError::Config)?;

    if settings.modules.is_empty() {
        return Err(AppError::NoModules);
    }

    let client = ApiClient::new(&settings.endpoint, settings.api_key.clone())
        .map_err(|e| AppError::Config(e.into()))?;

    // Checked before analysis so a missing key doesn't cost a full run.
    let destination = match &cli.output {
        Some(target) => Destination::Local(target.clone()),
        None => {
            if !client.has_api_key() {
                return Err(AppError::MissingApiKey {
                    endpoint: settings.endpoint.clone(),
                });
            }
            let locator = settings
                .project_locator()
                .map_err(|e| AppError::Config(e.into()))?;
            Destination::Upload(locator)
        }
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if interrupted_twice(on_interrupt, tokio::signal::ctrl_c).await {
            warn!("Interrupted again; aborting");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    });

    let progress: Arc<dyn ProgressSink> = if cli.quiet {
        Arc::new(SilentProgress)
    } else {
        Arc::new(TerminalProgress::new())
    };

    let modules = std::mem::take(&mut settings.modules);
    info!(modules = modules.len(), project = %settings.project, "starting analysis");
    let modules = Orchestrator::new(
        Arc::new(AnalyzerRegistry::with_defaults()),
        Arc::new(client.clone()),
        progress,
    )
    .with_concurrency(settings.concurrency)
    .with_cancellation(cancel)
    .run(modules)
    .await?;

    let units = normalize(&modules)?;

    match destination {
        Destination::Local(target) => {
            report::write_report(cli.format, &modules, &units, &settings.project, &target)
                .map_err(AppError::Output)?;
        }
        Destination::Upload(locator) => {
            let uploaded = client
                .upload(&settings.title, &locator, &settings.options, &units)
                .await?;
            info!(
                fetcher = uploaded.fetcher(),
                project = uploaded.project(),
                revision = uploaded.revision(),
                "upload complete"
            );

            let url = client.report_url(&uploaded, settings.options.branch.as_deref());
            println!();
            println!("============================================================");
            println!();
            println!("    View upload: {}", url.bright_blue());
            println!();
            println!("============================================================");
        }
    }

    Ok(())
}

/// Cancel `cancel` on the first interrupt, then wait for another one.
/// Returns `false` if interrupts cannot be listened for.
async fn interrupted_twice<F, Fut>(cancel: CancellationToken, mut next_interrupt: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next_interrupt().await.is_err() {
        return false;
    }
    warn!("Interrupted; waiting for in-flight modules (Ctrl-C again to abort)");
    cancel.cancel();
    next_interrupt().await.is_ok()
}

fn init_logging_from_args(cli: &Cli) {
    let level = if let Some(level_str) = &cli.log_level {
        parse_level(level_str)
    } else if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        let level_str = env::var("DEPSYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        parse_level(&level_str)
    };

    let mut filter = EnvFilter::from_default_env();
    if env::var("RUST_LOG").is_err() {
        let directives = [
            format!("depsync={}", level),
            "h2=warn".to_string(),
            "hyper=warn".to_string(),
            "reqwest=warn".to_string(),
        ];
        for directive in directives {
            if let Ok(directive) = directive.parse::<Directive>() {
                filter = filter.add_directive(directive);
            }
        }
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn parse_level(level: &str) -> Level {
    level.trim().parse().unwrap_or(Level::INFO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_first_interrupt_cancels_second_aborts() {
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);

        let abort = interrupted_twice(cancel.clone(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(()))
        })
        .await;

        assert!(abort);
        assert!(cancel.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unavailable_signal_handler_changes_nothing() {
        let cancel = CancellationToken::new();
        let abort = interrupted_twice(cancel.clone(), || {
            futures::future::ready(Err(std::io::Error::other("no signal handler")))
        })
        .await;

        assert!(!abort);
        assert!(!cancel.is_cancelled());
    }
}
