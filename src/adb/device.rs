//! Typed device operations over a [`DeviceChannel`].

use std::path::Path;

use anyhow::{bail, Result};
use tracing::{debug, warn};

use crate::adb::channel::{CommandOutput, DeviceChannel};
use crate::adb::parse::{
    is_missing_path, parse_devices, parse_dumpsys_package, parse_pm_path, DeviceEntry,
    InstalledPackage,
};

/// One connected device, addressed by serial.
pub struct Device<'c> {
    channel: &'c dyn DeviceChannel,
    serial: String,
}

impl<'c> Device<'c> {
    pub fn new(channel: &'c dyn DeviceChannel, serial: impl Into<String>) -> Self {
        Device {
            channel,
            serial: serial.into(),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Run an adb command scoped to this device.
    pub fn run<S: AsRef<str>>(&self, args: &[S]) -> Result<CommandOutput> {
        let args: Vec<String> = args.iter().map(|a| a.as_ref().to_string()).collect();
        debug!(serial = %self.serial, command = %args.join(" "), "adb");
        let output = self.channel.run(Some(&self.serial), &args)?;
        if !output.success() {
            debug!(serial = %self.serial, status = output.status, "adb command failed");
        }
        Ok(output)
    }

    /// Run `adb shell <args>`.
    pub fn shell<S: AsRef<str>>(&self, args: &[S]) -> Result<CommandOutput> {
        let mut full = vec!["shell".to_string()];
        full.extend(args.iter().map(|a| a.as_ref().to_string()));
        self.run(&full)
    }

    /// Read one system property; an unset property reads as empty.
    pub fn getprop(&self, prop: &str) -> Result<String> {
        let output = self.shell(&["getprop", prop])?;
        if !output.success() {
            bail!("getprop {} failed: {}", prop, output.combined().trim());
        }
        Ok(output.stdout.trim().to_string())
    }

    /// `install` for one file, `install-multiple` for several.
    pub fn install<P: AsRef<Path>>(&self, flags: &[&str], files: &[P]) -> Result<CommandOutput> {
        let verb = if files.len() == 1 {
            "install"
        } else {
            "install-multiple"
        };
        let mut args = vec![verb.to_string()];
        args.extend(flags.iter().map(|f| f.to_string()));
        args.extend(files.iter().map(|f| f.as_ref().display().to_string()));
        self.run(&args)
    }

    pub fn push(&self, local: &Path, remote: &str) -> Result<CommandOutput> {
        self.run(&["push".to_string(), local.display().to_string(), remote.to_string()])
    }

    pub fn pull(&self, remote: &str, local: &Path) -> Result<CommandOutput> {
        self.run(&["pull".to_string(), remote.to_string(), local.display().to_string()])
    }

    /// Remove the package but keep its data and cache directories.
    pub fn uninstall_keep_data(&self, package: &str) -> Result<CommandOutput> {
        self.shell(&["pm", "uninstall", "-k", package])
    }

    /// On-device apk paths of an installed package.
    pub fn package_paths(&self, package: &str) -> Result<Vec<String>> {
        let output = self.shell(&["pm", "path", package])?;
        if !output.success() {
            bail!("pm path {} failed: {}", package, output.combined().trim());
        }
        Ok(parse_pm_path(&output.stdout))
    }

    /// Installed version and ABI, or `None` when the package is absent.
    pub fn installed_package(&self, package: &str) -> Result<Option<InstalledPackage>> {
        let output = self.shell(&["dumpsys", "package", package])?;
        if !output.success() {
            bail!("dumpsys package {} failed: {}", package, output.combined().trim());
        }
        Ok(parse_dumpsys_package(&output.stdout, package))
    }

    /// The legacy shell protocol exits 0 even when `ls` fails, so the
    /// output is checked as well.
    pub fn path_exists(&self, remote: &str) -> Result<bool> {
        let output = self.shell(&["ls", "-d", remote])?;
        Ok(output.success() && !is_missing_path(&output.combined()))
    }

    pub fn remove_files(&self, remote: &[String]) -> Result<CommandOutput> {
        let mut args = vec!["rm".to_string(), "-f".to_string()];
        args.extend(remote.iter().cloned());
        self.shell(&args)
    }
}

/// Enumerate devices known to adb.
pub fn list_devices(channel: &dyn DeviceChannel) -> Result<Vec<DeviceEntry>> {
    let output = channel.run(None, &["devices".to_string()])?;
    if !output.success() {
        bail!("`adb devices` failed: {}", output.combined().trim());
    }
    Ok(parse_devices(&output.stdout))
}

/// Usable devices, skipping offline and unauthorized entries.
pub fn usable_devices(channel: &dyn DeviceChannel) -> Result<Vec<String>> {
    let mut serials = Vec::new();
    for entry in list_devices(channel)? {
        if entry.state.is_usable() {
            serials.push(entry.serial);
        } else {
            warn!(serial = %entry.serial, state = ?entry.state, "skipping device");
        }
    }
    Ok(serials)
}
