//! `apkdeploy doctor` command

use anyhow::Result;

use apkdeploy::ops::{doctor, format_report};

use super::Context;

pub fn execute(ctx: &Context<'_>) -> Result<bool> {
    let report = doctor(&ctx.tools)?;

    let output = format_report(&report, ctx.shell.is_verbose());
    print!("{}", output);

    Ok(report.all_required_passed())
}
