//! `apkdeploy install` command

use std::time::Instant;

use anyhow::Result;

use apkdeploy::ops::{DeployOptions, Orchestrator};
use apkdeploy::util::config::RecoveryMode;
use apkdeploy::util::shell::{format_duration, Status};

use super::Context;
use crate::cli::InstallArgs;

pub fn execute(args: InstallArgs, ctx: &Context<'_>) -> Result<bool> {
    let channel = ctx.channel();
    let prompter = ctx.prompter(args.yes);

    let mut options = DeployOptions::from_config(&ctx.config);
    options.device = args.device;
    if args.no_recovery {
        options.recovery = RecoveryMode::Never;
    }

    let orchestrator = Orchestrator::new(
        &channel,
        prompter.as_ref(),
        ctx.shell,
        &ctx.config,
        &ctx.tools,
        options,
    );
    let start = Instant::now();
    let report = orchestrator.run(&args.paths);
    ctx.shell.status(
        Status::Finished,
        format!("install in {}", format_duration(start.elapsed())),
    );

    println!("{}", report.summary());
    Ok(report.all_succeeded())
}
