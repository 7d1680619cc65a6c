//! apkdeploy CLI - device-aware installer for Android packages

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use apkdeploy::core::DeployError;
use apkdeploy::util::Shell;

mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::Context;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let shell = Shell::from_flags(cli.global.quiet, cli.global.verbose, cli.global.color);

    // Set up logging; RUST_LOG overrides the default filter
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.global.verbose {
            EnvFilter::new("apkdeploy=debug")
        } else if cli.global.quiet {
            EnvFilter::new("apkdeploy=error")
        } else {
            EnvFilter::new("apkdeploy=info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match run(cli, &shell) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            match err.downcast_ref::<DeployError>() {
                Some(deploy) => shell.diagnostic(&deploy.to_diagnostic()),
                None => shell.error(format!("{:#}", err)),
            }
            ExitCode::FAILURE
        }
    }
}

/// Run the selected command; `Ok(false)` means it completed with failures.
fn run(cli: Cli, shell: &Shell) -> Result<bool> {
    let command = match cli.command {
        Commands::Completions(args) => {
            commands::completions::execute(args)?;
            return Ok(true);
        }
        command => command,
    };

    let ctx = Context::new(&cli.global, shell)?;

    match command {
        Commands::Install(args) => commands::install::execute(args, &ctx),
        Commands::Profile(args) => commands::profile::execute(args, &ctx),
        Commands::Resolve(args) => commands::resolve::execute(args, &ctx),
        Commands::Doctor => commands::doctor::execute(&ctx),
        Commands::Completions(_) => Ok(true),
    }
}
