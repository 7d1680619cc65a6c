//! Deployment error taxonomy.
//!
//! Every failure that can end a (device, package) item is a variant of
//! [`DeployError`]. Variants carry a stable diagnostic code and a `help`
//! remediation so the binary can render one actionable message per failure.

use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::util::diagnostic::Diagnostic;

/// Result alias for operations that fail with a [`DeployError`].
pub type DeployResult<T> = std::result::Result<T, DeployError>;

/// Error raised while resolving, installing or recovering a package.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum DeployError {
    #[error("no usable device is connected")]
    #[diagnostic(
        code(apkdeploy::no_devices),
        help("Connect a device with USB debugging enabled and accept the authorization prompt")
    )]
    NoDevices,

    #[error("{count} devices are connected and installing on all of them was not confirmed")]
    #[diagnostic(
        code(apkdeploy::multiple_devices_unconfirmed),
        help("Pass `--device <SERIAL>` to pick one device, or confirm the multi-device prompt")
    )]
    MultipleDevicesUnconfirmed { count: usize },

    #[error("device `{serial}` is unreachable: could not read {field}")]
    #[diagnostic(
        code(apkdeploy::device_unreachable),
        help("Check the connection and that `adb -s {serial} shell getprop` answers")
    )]
    DeviceUnreachable {
        serial: String,
        field: &'static str,
        reason: String,
    },

    #[error("device `{serial}` runs SDK {device_sdk}, but the package requires SDK {min_sdk}")]
    #[diagnostic(
        code(apkdeploy::sdk_too_low),
        help("Install on a device running Android SDK {min_sdk} or newer")
    )]
    SdkTooLow {
        serial: String,
        device_sdk: u32,
        min_sdk: u32,
    },

    #[error(
        "device `{serial}` runs SDK {device_sdk}, newer than the package target SDK {target_sdk}; \
         compatibility issues are possible"
    )]
    #[diagnostic(code(apkdeploy::sdk_too_high), severity(Warning))]
    SdkTooHighWarning {
        serial: String,
        device_sdk: u32,
        target_sdk: u32,
    },

    #[error(
        "no native code in the package matches device `{serial}` (package: {}; device: {})",
        .package_abis.join(", "),
        .device_abis.join(", ")
    )]
    #[diagnostic(
        code(apkdeploy::abi_mismatch),
        help("Obtain a build of the package for one of the device ABIs")
    )]
    AbiMismatch {
        serial: String,
        device_abis: Vec<String>,
        package_abis: Vec<String>,
    },

    #[error(
        "`{package}` version {installed} is installed and the candidate is version {candidate}; \
         proceeding was not confirmed"
    )]
    #[diagnostic(
        code(apkdeploy::version_unconfirmed),
        help("Re-run and confirm the prompt, or pass `--yes`, to replace the installed version")
    )]
    VersionDowngradeOrSameUnconfirmed {
        package: String,
        installed: u64,
        candidate: u64,
    },

    #[error(
        "`{package}` is installed for ABI {installed_abi} and the candidate targets {candidate_abi}; \
         proceeding was not confirmed"
    )]
    #[diagnostic(
        code(apkdeploy::abi_change_unconfirmed),
        help("Re-run and confirm the prompt, or pass `--yes`, to switch the installed ABI")
    )]
    AbiChangeUnconfirmed {
        package: String,
        installed_abi: String,
        candidate_abi: String,
    },

    #[error("the installer does not accept the flags `{flags}`")]
    #[diagnostic(code(apkdeploy::install_argument_unsupported))]
    InstallArgumentUnsupported { flags: String },

    #[error("the installer refused a test-only package without the test flag")]
    #[diagnostic(code(apkdeploy::install_test_only))]
    InstallTestOnlyRestricted,

    #[error("the installer rejected `{package}`: {reason}")]
    #[diagnostic(code(apkdeploy::install_rejected))]
    InstallRejected {
        package: String,
        reason: String,
        output: String,
    },

    #[error("installing `{package}` on `{serial}` failed after every install strategy")]
    #[diagnostic(
        code(apkdeploy::install_failed),
        help("Allow the keep-data reinstall when prompted, or uninstall the existing app manually")
    )]
    InstallFailedGeneric {
        package: String,
        serial: String,
        output: String,
    },

    #[error("keep-data reinstall of `{package}` was declined; the device was left unchanged")]
    #[diagnostic(code(apkdeploy::recovery_declined))]
    RecoveryDeclined { package: String },

    #[error("backup of `{package}` is incomplete: could not pull `{path}`")]
    #[diagnostic(
        code(apkdeploy::backup_incomplete),
        help("Nothing was uninstalled. Free local disk space or check device storage permissions")
    )]
    BackupIncomplete {
        package: String,
        path: String,
        reason: String,
    },

    #[error("keep-data uninstall of `{package}` failed; the existing installation was kept")]
    #[diagnostic(code(apkdeploy::uninstall_failed))]
    UninstallFailed { package: String, output: String },

    #[error("installing `{package}` failed; the previously installed version was restored")]
    #[diagnostic(
        code(apkdeploy::restored_previous),
        help("The device is back in its original state. Check the package file and retry")
    )]
    RecoveredPrevious { package: String, reason: String },

    #[error("restoring `{package}` failed; the device no longer has a working installation")]
    #[diagnostic(
        code(apkdeploy::restore_failed),
        help("Reinstall the backed-up files manually with `adb install-multiple`")
    )]
    RestoreFailed {
        package: String,
        backup_dir: PathBuf,
        reason: String,
    },

    #[error("`{}` is not a supported package (expected apk, xapk, apkm, apks or aab)", .path.display())]
    #[diagnostic(code(apkdeploy::unsupported_package))]
    UnsupportedPackage { path: PathBuf },

    #[error("invalid package descriptor in `{}`: {reason}", .path.display())]
    #[diagnostic(code(apkdeploy::invalid_descriptor))]
    InvalidDescriptor { path: PathBuf, reason: String },

    #[error("incomplete signing configuration: missing {}", .missing.join(", "))]
    #[diagnostic(
        code(apkdeploy::invalid_signing),
        help("Set all four of ks, ks_pass, ks_key_alias and key_pass, or none of them")
    )]
    InvalidSigningConfig { missing: Vec<&'static str> },

    #[error("bundletool failed: {output}")]
    #[diagnostic(
        code(apkdeploy::bundletool_failed),
        help(
            "Download bundletool from https://github.com/google/bundletool/releases and set \
             [tools] bundletool to the jar path"
        )
    )]
    BundleToolFailed { output: String },

    #[error("could not place expansion file `{file}`: {reason}")]
    #[diagnostic(code(apkdeploy::expansion_failed))]
    ExpansionFailed { file: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(apkdeploy::other))]
    Other(#[from] anyhow::Error),
}

impl DeployError {
    /// Errors that stop the whole batch instead of a single item.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, DeployError::MultipleDevicesUnconfirmed { .. })
    }

    /// Errors after which a keep-data reinstall may still succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DeployError::InstallFailedGeneric { .. })
    }

    /// Convert to a user-facing diagnostic with context and remediation.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = match self.severity() {
            Some(miette::Severity::Warning) => Diagnostic::warning(self.to_string()),
            _ => Diagnostic::error(self.to_string()),
        };

        match self {
            DeployError::DeviceUnreachable { reason, .. }
            | DeployError::BackupIncomplete { reason, .. }
            | DeployError::RecoveredPrevious { reason, .. } => {
                diag = diag.with_context(reason.clone());
            }
            DeployError::InstallRejected { output, .. }
            | DeployError::InstallFailedGeneric { output, .. }
            | DeployError::UninstallFailed { output, .. } => {
                if let Some(line) = last_meaningful_line(output) {
                    diag = diag.with_context(format!("installer said: {}", line));
                }
            }
            DeployError::RestoreFailed {
                backup_dir, reason, ..
            } => {
                diag = diag
                    .with_context(reason.clone())
                    .with_context(format!("backup kept at {}", backup_dir.display()))
                    .with_location(backup_dir.clone());
            }
            DeployError::Other(err) => {
                for cause in err.chain().skip(1) {
                    diag = diag.with_context(cause.to_string());
                }
            }
            _ => {}
        }

        if let Some(help) = self.help() {
            diag = diag.with_suggestion(help.to_string());
        }

        diag
    }
}

fn last_meaningful_line(output: &str) -> Option<&str> {
    output.lines().map(str::trim).filter(|l| !l.is_empty()).last()
}
