//! `apkdeploy profile` command

use anyhow::Result;

use apkdeploy::adb::Device;
use apkdeploy::core::DeviceProfile;

use super::Context;
use crate::cli::ProfileArgs;

pub fn execute(args: ProfileArgs, ctx: &Context<'_>) -> Result<bool> {
    let channel = ctx.channel();
    let density = ctx.config.density_policy();

    let mut snapshots = Vec::new();
    let mut ok = true;
    for serial in ctx.devices(args.device.as_deref())? {
        let device = Device::new(&channel, serial);
        match DeviceProfile::new(&device, density.clone()).snapshot() {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(err) => {
                ctx.shell.diagnostic(&err.to_diagnostic());
                ok = false;
            }
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
    } else {
        for snapshot in &snapshots {
            println!("{}", snapshot);
        }
    }

    Ok(ok)
}
