use anyhow::{Context, Result};
use std::io::{self, IsTerminal};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod error;
mod executor;
mod invocation;
mod manifest;
mod pipeline;
mod preflight;
mod prompt;
mod settings;
mod transfer;
mod workspace;

use cli::{Invocation, RootArgs};
use executor::SystemRunner;
use manifest::RunManifest;
use pipeline::{Outcome, Pipeline};
use prompt::Console;
use settings::Settings;
use workspace::VglWorkspace;

fn main() -> ExitCode {
    let args = match cli::parse(std::env::args_os()) {
        Ok(Invocation::Run(args)) => args,
        Ok(Invocation::Info(text)) => {
            print!("{text}");
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            init_tracing(false, false);
            tracing::error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(args.verbose, args.quiet);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr; `RUST_LOG` takes precedence over `--verbose`/`--quiet`.
fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .without_time()
        .with_target(false)
        .try_init();
}

fn run(args: RootArgs) -> Result<()> {
    let pending = config::resolve(args)?;

    let stdin = io::stdin();
    let mut console = Console::new(stdin.lock(), io::stderr());
    let config = prompt::resolve_interactively(pending, &mut console)?;
    let settings = Settings::from_env()?;

    let mut runner = SystemRunner;
    preflight::check(&config, &settings, &mut runner).into_result()?;

    let report = Pipeline::new(&config, &settings, &mut runner, &mut console)?.run()?;

    if config.dry_run {
        tracing::info!(
            stages = report.stages.len(),
            "dry-run complete; nothing was executed or written"
        );
        return Ok(());
    }

    let manifest_path = VglWorkspace::new(report.workspace.clone()).manifest_path();
    RunManifest::new(&config, &settings, &report)
        .write(&manifest_path)
        .with_context(|| format!("write run manifest {}", manifest_path.display()))?;

    match &report.outcome {
        Outcome::Completed => tracing::info!(
            workspace = %report.workspace.display(),
            stages = report.stages.len(),
            map_tiles = report.map_tiles_copied,
            "geolocalization complete; results are under output/"
        ),
        Outcome::StoppedAtReview { orthophoto } => tracing::info!(
            orthophoto = %orthophoto.display(),
            "stopped after orthophoto review; rerun with --skip-orthophoto-review to continue"
        ),
    }
    Ok(())
}
