//! Command line runner for record pipelines.
//!
//! Loads the layered configuration, applies command line overrides and runs pipelines
//! between record files. Also exposes the dedup helpers to filter URL lists against the
//! output of a previous run.

use clap::Parser;
use telemetry::tracing::init_tracing;
use tracing::error;

use crate::cli::{Cli, Command, RunArgs, UnseenArgs};
use crate::config::{apply_run_args, load_runner_config};
use crate::error::{RunnerError, RunnerResult};

mod cli;
mod config;
mod core;
mod error;

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let _log_flusher = match init_tracing(env!("CARGO_BIN_NAME")) {
        Ok(log_flusher) => log_flusher,
        Err(err) => {
            eprint!("{}", RunnerError::config(err).render_report());
            return std::process::ExitCode::FAILURE;
        }
    };

    match try_main(cli) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprint!("{}", err.render_report());
            std::process::ExitCode::FAILURE
        }
    }
}

fn try_main(cli: Cli) -> RunnerResult<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> RunnerResult<()> {
    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Transforms => {
            for name in crate::core::transforms() {
                println!("{name}");
            }
            Ok(())
        }
        Command::Unseen(args) => unseen(args).await,
    }
}

async fn run(args: RunArgs) -> RunnerResult<()> {
    let config = apply_run_args(load_runner_config()?, &args)?;

    crate::core::run(config, args.transform_config(), &args.input, &args.output).await?;

    Ok(())
}

async fn unseen(args: UnseenArgs) -> RunnerResult<()> {
    let config = load_runner_config()?;
    config.validate().map_err(RunnerError::config)?;

    for url in crate::core::unseen_urls(&config, &args.urls, &args.seen).await? {
        println!("{url}");
    }

    Ok(())
}
