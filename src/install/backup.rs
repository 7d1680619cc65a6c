//! Backup, keep-data uninstall, reinstall, and restore on failure.
//!
//! Nothing destructive happens before every artifact of the installed
//! package has been pulled: a [`BackupRecord`] exists only after a complete
//! backup, and the uninstall takes one.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::adb::parse::is_missing_path;
use crate::adb::Device;
use crate::core::error::{DeployError, DeployResult};
use crate::install::executor::{InstallExecutor, InstallOptions, InstallReport, InstallRequest};
use crate::install::flags::InstallFailure;
use crate::util::fs::{ensure_dir, file_name_str};
use crate::util::prompt::Prompter;

/// Companion data root on shared storage.
pub const OBB_ROOT: &str = "/storage/emulated/0/Android/obb";

/// A complete local copy of one installed package.
#[derive(Debug)]
pub struct BackupRecord {
    pub package: String,
    pub dir: TempDir,
    /// Pulled apk files.
    pub artifacts: Vec<PathBuf>,
    /// Local copy of `OBB_ROOT/<package>`, when the device had one.
    pub obb: Option<PathBuf>,
}

impl BackupRecord {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// How a recovery cycle ended without an error.
#[derive(Debug)]
pub enum RecoveryOutcome {
    /// The new package installed after the keep-data uninstall.
    Reinstalled(InstallReport),
    /// The reinstall failed and the previous installation was put back.
    RestoredPrevious { reason: String },
}

pub struct BackupRestoreManager<'a> {
    device: &'a Device<'a>,
    prompter: &'a dyn Prompter,
    backup_root: PathBuf,
    confirm_version: bool,
}

impl<'a> BackupRestoreManager<'a> {
    pub fn new(device: &'a Device<'a>, prompter: &'a dyn Prompter, backup_root: PathBuf) -> Self {
        BackupRestoreManager {
            device,
            prompter,
            backup_root,
            confirm_version: false,
        }
    }

    /// Repeat the version and ABI confirmation during the reinstall.
    pub fn confirm_version(mut self, confirm: bool) -> Self {
        self.confirm_version = confirm;
        self
    }

    /// Back up, uninstall keeping data, reinstall `request`, restore on failure.
    pub fn recover(&self, request: &InstallRequest) -> DeployResult<RecoveryOutcome> {
        let package = &request.package_name;
        let question = format!(
            "Installing `{}` on {} failed. Back up the installed app, uninstall it keeping its \
             data, and reinstall? This can take a while and risks data loss.",
            package,
            self.device.serial()
        );
        if !self.prompter.confirm(&question, false)? {
            return Err(DeployError::RecoveryDeclined {
                package: package.clone(),
            });
        }

        let record = self.backup(package)?;
        info!(
            serial = self.device.serial(),
            package = %package,
            files = record.artifacts.len(),
            dir = %record.path().display(),
            "backup complete"
        );

        self.uninstall(&record)?;

        let options = InstallOptions {
            confirm_existing: self.confirm_version,
        };
        match InstallExecutor::new(self.device, self.prompter).install(request, options) {
            Ok(report) => Ok(RecoveryOutcome::Reinstalled(report)),
            Err(err) => {
                warn!(serial = self.device.serial(), package = %package, "reinstall failed: {}", err);
                let reason = err.to_string();
                self.restore(record)?;
                Ok(RecoveryOutcome::RestoredPrevious { reason })
            }
        }
    }

    /// Pull every on-device file of `package` into a fresh directory.
    pub fn backup(&self, package: &str) -> DeployResult<BackupRecord> {
        let incomplete = |path: &str, reason: String| DeployError::BackupIncomplete {
            package: package.to_string(),
            path: path.to_string(),
            reason,
        };

        ensure_dir(&self.backup_root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", package))
            .tempdir_in(&self.backup_root)
            .map_err(|e| incomplete(&self.backup_root.display().to_string(), e.to_string()))?;

        let remote_paths = self
            .device
            .package_paths(package)
            .map_err(|e| incomplete("pm path", format!("{:#}", e)))?;
        if remote_paths.is_empty() {
            return Err(incomplete("pm path", "no installed files were reported".into()));
        }

        let mut artifacts = Vec::with_capacity(remote_paths.len());
        for remote in &remote_paths {
            let local = dir.path().join(file_name_str(Path::new(remote)));
            let output = self
                .device
                .pull(remote, &local)
                .map_err(|e| incomplete(remote, format!("{:#}", e)))?;
            if !output.success() {
                return Err(incomplete(remote, output.combined().trim().to_string()));
            }
            artifacts.push(local);
        }

        let obb_remote = format!("{}/{}", OBB_ROOT, package);
        let has_obb = self
            .device
            .path_exists(&obb_remote)
            .map_err(|e| incomplete(&obb_remote, format!("{:#}", e)))?;
        let obb = if has_obb {
            let obb_dir = dir.path().join("obb");
            ensure_dir(&obb_dir)?;
            let output = self
                .device
                .pull(&obb_remote, &obb_dir)
                .map_err(|e| incomplete(&obb_remote, format!("{:#}", e)))?;
            if output.success() {
                Some(obb_dir.join(package))
            } else if is_missing_path(&output.combined()) {
                debug!(serial = self.device.serial(), package, "no companion data to back up");
                None
            } else {
                return Err(incomplete(&obb_remote, output.combined().trim().to_string()));
            }
        } else {
            None
        };

        Ok(BackupRecord {
            package: package.to_string(),
            dir,
            artifacts,
            obb,
        })
    }

    fn uninstall(&self, record: &BackupRecord) -> DeployResult<()> {
        let output = self.device.uninstall_keep_data(&record.package)?;
        if !output.success() || !output.combined().contains("Success") {
            return Err(DeployError::UninstallFailed {
                package: record.package.clone(),
                output: output.combined(),
            });
        }
        info!(serial = self.device.serial(), package = %record.package, "uninstalled keeping data");
        Ok(())
    }

    /// Reinstall the backed-up apks and push companion data back.
    ///
    /// On failure the backup directory is kept and named in the error.
    fn restore(&self, record: BackupRecord) -> DeployResult<()> {
        match self.try_restore(&record) {
            Ok(()) => {
                info!(serial = self.device.serial(), package = %record.package, "previous installation restored");
                Ok(())
            }
            Err(reason) => Err(DeployError::RestoreFailed {
                package: record.package.clone(),
                backup_dir: record.dir.keep(),
                reason,
            }),
        }
    }

    fn try_restore(&self, record: &BackupRecord) -> Result<(), String> {
        if record.artifacts.is_empty() {
            return Err("the backup holds no apk files".into());
        }

        let output = self
            .device
            .install(&["-r", "-d"], &record.artifacts)
            .map_err(|e| format!("{:#}", e))?;
        if let Some(failure) = InstallFailure::classify(&output) {
            return Err(format!(
                "reinstalling the backup failed ({}): {}",
                failure.describe(),
                output.combined().trim()
            ));
        }

        if let Some(obb) = &record.obb {
            let output = self
                .device
                .push(obb, &format!("{}/", OBB_ROOT))
                .map_err(|e| format!("{:#}", e))?;
            if !output.success() {
                return Err(format!(
                    "pushing companion data back failed: {}",
                    output.combined().trim()
                ));
            }
        }
        Ok(())
    }
}
