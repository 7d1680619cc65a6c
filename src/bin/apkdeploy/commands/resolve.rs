//! `apkdeploy resolve` command

use anyhow::Result;
use serde_json::json;

use apkdeploy::adb::Device;
use apkdeploy::core::{DeviceProfile, DeviceSnapshot, PackageDescriptor};
use apkdeploy::ops::Payload;
use apkdeploy::resolver::{check_compatibility, Resolution, VariantResolver};
use apkdeploy::util::shell::Status;
use apkdeploy::DeployResult;

use super::Context;
use crate::cli::ResolveArgs;

pub fn execute(args: ResolveArgs, ctx: &Context<'_>) -> Result<bool> {
    let loaded = ctx.loader().load(&args.path)?;
    let descriptor = match &loaded.payload {
        Payload::Descriptor(descriptor) => descriptor,
        Payload::Apks(_) | Payload::Aab(_) => {
            ctx.shell.note(format!(
                "{} packages are split by bundletool at install time",
                loaded.kind
            ));
            return Ok(true);
        }
    };

    let channel = ctx.channel();
    let density = ctx.config.density_policy();
    let resolver = VariantResolver::new(&density);

    let mut results = Vec::new();
    let mut ok = true;
    for serial in ctx.devices(args.device.as_deref())? {
        let device = Device::new(&channel, serial);
        match resolve_for(ctx, &device, &resolver, descriptor) {
            Ok(result) => results.push(result),
            Err(err) => {
                ctx.shell.diagnostic(&err.to_diagnostic());
                ok = false;
            }
        }
    }

    if args.json {
        let json: Vec<_> = results
            .iter()
            .map(|(snapshot, resolution)| {
                json!({
                    "serial": snapshot.serial,
                    "package": descriptor.package_name,
                    "device": snapshot,
                    "resolution": resolution,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(ok);
    }

    for (snapshot, resolution) in &results {
        ctx.shell.status(
            Status::Device,
            format!(
                "{} ({}, {}, {}, SDK {})",
                snapshot.serial,
                snapshot.abi,
                snapshot.density_bucket,
                snapshot.locale,
                snapshot.sdk_version
            ),
        );
        for entry in &resolution.selected {
            println!("{:<10} {}", entry.category.to_string(), entry.file.display());
        }
    }
    Ok(ok)
}

fn resolve_for(
    ctx: &Context<'_>,
    device: &Device<'_>,
    resolver: &VariantResolver<'_>,
    descriptor: &PackageDescriptor,
) -> DeployResult<(DeviceSnapshot, Resolution)> {
    let snapshot = DeviceProfile::new(device, ctx.config.density_policy()).snapshot()?;
    if let Some(warning) = check_compatibility(&snapshot, descriptor)? {
        ctx.shell.diagnostic(&warning.to_diagnostic());
    }
    let resolution = resolver.resolve(&snapshot, descriptor)?;
    for warning in &resolution.warnings {
        ctx.shell.warn(warning);
    }
    Ok((snapshot, resolution))
}
