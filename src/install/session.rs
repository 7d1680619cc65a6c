//! Session-based install: `pm install-create`, then for each file a push
//! to the staging directory and `pm install-write`, then
//! `pm install-commit`.
//!
//! Staged files are removed and an uncommitted session is abandoned on
//! every exit path, including early returns and errors.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::adb::parse::parse_session_id;
use crate::adb::{CommandOutput, Device};
use crate::install::flags::TEST_FLAG;
use crate::util::fs::file_name_str;
use crate::util::hash::short_hash;

/// On-device directory files are staged in.
pub const STAGING_DIR: &str = "/data/local/tmp";

/// Install `files` through a package manager session.
///
/// Returns the output of the step that failed, or of the commit. The caller
/// classifies it like any other installer output.
pub fn install_with_session(
    device: &Device<'_>,
    files: &[PathBuf],
    test_flag: bool,
) -> Result<CommandOutput> {
    let mut parts = Vec::with_capacity(files.len());
    for (index, file) in files.iter().enumerate() {
        let size = fs::metadata(file)
            .with_context(|| format!("failed to stat {}", file.display()))?
            .len();
        parts.push((file, format!("{}_{}", index, file_name_str(file)), size));
    }

    let mut create = vec!["pm", "install-create", "-r"];
    if test_flag {
        create.push(TEST_FLAG);
    }
    let output = device.shell(&create[..])?;
    let Some(id) = parse_session_id(&output.combined()) else {
        return Ok(failed(output));
    };
    // Dropped after the session: abandon first, then remove.
    let mut staged = StagedFiles::new(device);
    let mut session = OpenSession::new(device, id);
    debug!(serial = device.serial(), session = id, "install session created");

    for (file, name, size) in parts {
        let remote = staging_path(file);
        let output = device.push(file, &remote)?;
        if !output.success() {
            return Ok(output);
        }
        staged.add(remote.clone());

        let output = device.shell(&[
            "pm".to_string(),
            "install-write".to_string(),
            "-S".to_string(),
            size.to_string(),
            id.to_string(),
            name,
            remote,
        ])?;
        if !output.success() || !output.combined().contains("Success") {
            return Ok(failed(output));
        }
    }

    let output = device.shell(&["pm".to_string(), "install-commit".to_string(), id.to_string()])?;
    session.committed = true;
    Ok(output)
}

/// `pm` reports some failures with a zero exit status.
fn failed(mut output: CommandOutput) -> CommandOutput {
    if output.success() {
        output.status = 1;
    }
    output
}

fn staging_path(local: &Path) -> String {
    format!(
        "{}/apkdeploy-{}-{}",
        STAGING_DIR,
        short_hash(&local.display().to_string()),
        file_name_str(local)
    )
}

/// Files pushed to the device, removed on drop.
struct StagedFiles<'d> {
    device: &'d Device<'d>,
    remote: Vec<String>,
}

impl<'d> StagedFiles<'d> {
    fn new(device: &'d Device<'d>) -> Self {
        StagedFiles {
            device,
            remote: Vec::new(),
        }
    }

    fn add(&mut self, remote: String) {
        self.remote.push(remote);
    }
}

impl Drop for StagedFiles<'_> {
    fn drop(&mut self) {
        if self.remote.is_empty() {
            return;
        }
        match self.device.remove_files(&self.remote) {
            Ok(output) if output.success() => {}
            Ok(output) => warn!(
                serial = self.device.serial(),
                output = %output.combined().trim(),
                "failed to remove staged files"
            ),
            Err(err) => warn!(serial = self.device.serial(), "failed to remove staged files: {:#}", err),
        }
    }
}

/// Session that is abandoned on drop unless committed.
struct OpenSession<'d> {
    device: &'d Device<'d>,
    id: u32,
    committed: bool,
}

impl<'d> OpenSession<'d> {
    fn new(device: &'d Device<'d>, id: u32) -> Self {
        OpenSession {
            device,
            id,
            committed: false,
        }
    }
}

impl Drop for OpenSession<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let id = self.id.to_string();
        if let Err(err) = self.device.shell(&["pm", "install-abandon", id.as_str()]) {
            warn!(serial = self.device.serial(), session = self.id, "failed to abandon session: {:#}", err);
        }
    }
}
