//! Implementation of `apkdeploy install`.
//!
//! Every input is loaded once, then resolved, installed and, when the
//! installer gives up, recovered on each selected device in turn. Each
//! (package, device) pair becomes one [`ItemReport`]; only a declined
//! multi-device confirmation stops the batch.

use std::cell::Cell;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use tracing::{debug, info};

use crate::adb::{usable_devices, Device, DeviceChannel};
use crate::core::device::{DensityPolicy, DeviceProfile};
use crate::core::error::{DeployError, DeployResult};
use crate::core::package::{Expansion, PackageDescriptor, SplitClassifier};
use crate::install::{
    BackupRestoreManager, FlagState, InstallExecutor, InstallOptions, InstallRequest,
    RecoveryOutcome,
};
use crate::ops::bundle::BundleTool;
use crate::ops::package_loader::{LoadedPackage, PackageLoader, Payload};
use crate::resolver::{check_compatibility, VariantResolver};
use crate::util::config::{Config, RecoveryMode, SigningConfig, SigningKey, Tools};
use crate::util::fs::file_name_str;
use crate::util::prompt::Prompter;
use crate::util::shell::{Shell, Status};

/// The only expansion location that can be written without root.
pub const EXTERNAL_STORAGE: &str = "EXTERNAL_STORAGE";
/// Where `EXTERNAL_STORAGE` expansions land.
pub const EXTERNAL_STORAGE_ROOT: &str = "/storage/emulated/0";

/// Options for the install command.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Restrict the batch to one serial
    pub device: Option<String>,

    /// Whether a failed install may fall back to a keep-data reinstall
    pub recovery: RecoveryMode,

    /// Ask the version/ABI questions again before the recovery reinstall
    pub confirm_version_on_recovery: bool,

    /// Root directory for recovery backups
    pub backup_root: PathBuf,
}

impl DeployOptions {
    pub fn from_config(config: &Config) -> Self {
        DeployOptions {
            device: None,
            recovery: config.policy.recovery(),
            confirm_version_on_recovery: config.policy.confirm_version_on_recovery(),
            backup_root: config.backup_root(),
        }
    }
}

/// How an item ended up installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Installed {
    /// Installed through adb at the given flag level.
    Adb {
        package: String,
        state: Option<FlagState>,
    },
    /// Installed after backing up and uninstalling the previous version.
    Reinstalled {
        package: String,
        state: Option<FlagState>,
    },
    /// Installed by bundletool.
    BundleTool,
}

/// Result of one (package, device) pair.
#[derive(Debug)]
pub struct ItemReport {
    pub source: PathBuf,
    /// `None` when the item failed before a device was chosen.
    pub serial: Option<String>,
    pub warnings: Vec<String>,
    pub outcome: DeployResult<Installed>,
}

impl ItemReport {
    fn failed(source: &Path, serial: Option<String>, err: DeployError) -> Self {
        ItemReport {
            source: source.to_path_buf(),
            serial,
            warnings: Vec::new(),
            outcome: Err(err),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Tally of a whole batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub items: Vec<ItemReport>,
    /// Set when a batch-fatal error stopped processing early.
    pub aborted: bool,
}

impl BatchReport {
    pub fn attempted(&self) -> usize {
        self.items.len()
    }

    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.succeeded()).count()
    }

    pub fn all_succeeded(&self) -> bool {
        !self.aborted && self.items.iter().all(ItemReport::succeeded)
    }

    /// `N attempted, M succeeded`
    pub fn summary(&self) -> String {
        format!("{} attempted, {} succeeded", self.attempted(), self.succeeded())
    }
}

/// Sequences loading, resolution, installation and recovery.
pub struct Orchestrator<'a> {
    channel: &'a dyn DeviceChannel,
    prompter: &'a dyn Prompter,
    shell: &'a Shell,
    loader: PackageLoader,
    bundletool: BundleTool,
    density: DensityPolicy,
    signing: SigningConfig,
    options: DeployOptions,
    all_devices_confirmed: Cell<bool>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        channel: &'a dyn DeviceChannel,
        prompter: &'a dyn Prompter,
        shell: &'a Shell,
        config: &Config,
        tools: &Tools,
        options: DeployOptions,
    ) -> Self {
        let resolver = config.resolver_config();
        Orchestrator {
            channel,
            prompter,
            shell,
            loader: PackageLoader::new(
                SplitClassifier::new(resolver.fallback_languages, resolver.excluded_features),
                &tools.aapt,
            ),
            bundletool: BundleTool::new(&tools.java, &tools.bundletool),
            density: config.density_policy(),
            signing: config.signing.clone(),
            options,
            all_devices_confirmed: Cell::new(false),
        }
    }

    /// Process every input in order.
    pub fn run(&self, inputs: &[PathBuf]) -> BatchReport {
        let mut report = BatchReport::default();

        for input in inputs {
            let loaded = match self.loader.load(input) {
                Ok(loaded) => loaded,
                Err(err) => {
                    self.record(&mut report, ItemReport::failed(input, None, err));
                    continue;
                }
            };

            if let Err(err) = self.deploy(&loaded, &mut report) {
                self.record(&mut report, ItemReport::failed(input, None, err));
                report.aborted = true;
                break;
            }
            // `loaded` drops here, removing its working directory.
        }

        report
    }

    /// Deploy one package to every selected device.
    ///
    /// Item failures are recorded in `report`; an `Err` is batch-fatal.
    pub fn deploy(&self, loaded: &LoadedPackage, report: &mut BatchReport) -> DeployResult<()> {
        let serials = match self.select_devices() {
            Ok(serials) => serials,
            Err(err) if err.is_batch_fatal() => return Err(err),
            Err(err) => {
                self.record(report, ItemReport::failed(&loaded.source, None, err));
                return Ok(());
            }
        };

        let signing = match &loaded.payload {
            Payload::Aab(_) => match self.signing.validate() {
                Ok(signing) => signing,
                Err(err) => {
                    self.record(report, ItemReport::failed(&loaded.source, None, err));
                    return Ok(());
                }
            },
            _ => None,
        };

        for serial in serials {
            let mut warnings = Vec::new();
            let outcome = self.deploy_to_device(loaded, &serial, signing.as_ref(), &mut warnings);
            self.record(
                report,
                ItemReport {
                    source: loaded.source.clone(),
                    serial: Some(serial),
                    warnings,
                    outcome,
                },
            );
        }
        Ok(())
    }

    /// Usable devices, narrowed by `--device` and confirmed when several.
    ///
    /// The multi-device question is asked at most once per batch.
    pub fn select_devices(&self) -> DeployResult<Vec<String>> {
        let serials = usable_devices(self.channel)?;

        if let Some(wanted) = &self.options.device {
            if serials.iter().any(|s| s == wanted) {
                return Ok(vec![wanted.clone()]);
            }
            return Err(DeployError::Other(anyhow!(
                "device `{}` is not connected (usable: {})",
                wanted,
                if serials.is_empty() {
                    "none".to_string()
                } else {
                    serials.join(", ")
                }
            )));
        }

        match serials.len() {
            0 => Err(DeployError::NoDevices),
            1 => Ok(serials),
            count => {
                if !self.all_devices_confirmed.get() {
                    let question = format!(
                        "{} devices are connected ({}). Install on all of them?",
                        count,
                        serials.join(", ")
                    );
                    if !self.prompter.confirm(&question, false)? {
                        return Err(DeployError::MultipleDevicesUnconfirmed { count });
                    }
                    self.all_devices_confirmed.set(true);
                }
                Ok(serials)
            }
        }
    }

    fn deploy_to_device(
        &self,
        loaded: &LoadedPackage,
        serial: &str,
        signing: Option<&SigningKey>,
        warnings: &mut Vec<String>,
    ) -> DeployResult<Installed> {
        let device = Device::new(self.channel, serial);

        match &loaded.payload {
            Payload::Descriptor(descriptor) => self.install_descriptor(&device, descriptor, warnings),
            Payload::Apks(apks) => {
                let _spinner = self.shell.spinner(
                    Status::Installing,
                    format!("{} on {} with bundletool", file_name_str(apks), serial),
                );
                self.bundletool.install_apks(apks, serial)?;
                Ok(Installed::BundleTool)
            }
            Payload::Aab(bundle) => {
                let out_dir = loaded.workspace().ok_or_else(|| {
                    anyhow!("no working directory for {}", loaded.source.display())
                })?;
                let apks = {
                    let _spinner = self.shell.spinner(
                        Status::Building,
                        format!("{} for {}", file_name_str(bundle), serial),
                    );
                    self.bundletool.build_apks(bundle, serial, out_dir, signing)?
                };
                let _spinner = self.shell.spinner(
                    Status::Installing,
                    format!("{} on {} with bundletool", file_name_str(&apks), serial),
                );
                self.bundletool.install_apks(&apks, serial)?;
                Ok(Installed::BundleTool)
            }
        }
    }

    fn install_descriptor(
        &self,
        device: &Device<'_>,
        descriptor: &PackageDescriptor,
        warnings: &mut Vec<String>,
    ) -> DeployResult<Installed> {
        let profile = DeviceProfile::new(device, self.density.clone());
        let snapshot = profile.snapshot()?;
        debug!(
            serial = %snapshot.serial,
            abi = %snapshot.abi,
            density = %snapshot.density_bucket,
            locale = %snapshot.locale,
            sdk = snapshot.sdk_version,
            "device profile"
        );

        if let Some(warning) = check_compatibility(&snapshot, descriptor)? {
            self.shell.diagnostic(&warning.to_diagnostic());
            warnings.push(warning.to_string());
        }

        self.shell.status(
            Status::Resolving,
            format!("{} for {}", descriptor.package_name, snapshot.serial),
        );
        let resolution = VariantResolver::new(&self.density).resolve(&snapshot, descriptor)?;
        for warning in &resolution.warnings {
            self.shell.warn(warning);
        }
        warnings.extend(resolution.warnings.iter().cloned());

        check_expansions(&descriptor.expansions)?;

        let request = InstallRequest {
            package_name: descriptor.package_name.clone(),
            version_code: descriptor.version_code,
            files: resolution.files,
            abi: resolution.primary_abi,
        };
        let installed = self.install_with_recovery(device, &request)?;

        self.push_expansions(device, &descriptor.expansions)?;
        Ok(installed)
    }

    fn install_with_recovery(
        &self,
        device: &Device<'_>,
        request: &InstallRequest,
    ) -> DeployResult<Installed> {
        let package = request.package_name.clone();
        self.shell.status(
            Status::Installing,
            format!("{} ({} files) on {}", package, request.files.len(), device.serial()),
        );

        let err = match InstallExecutor::new(device, self.prompter)
            .install(request, InstallOptions::default())
        {
            Ok(report) => {
                return Ok(Installed::Adb {
                    package,
                    state: report.final_state(),
                })
            }
            Err(err) => err,
        };

        if !err.is_recoverable() || self.options.recovery == RecoveryMode::Never {
            return Err(err);
        }

        self.shell.warn(format!("{}", err));
        let manager =
            BackupRestoreManager::new(device, self.prompter, self.options.backup_root.clone())
                .confirm_version(self.options.confirm_version_on_recovery);

        match manager.recover(request)? {
            RecoveryOutcome::Reinstalled(report) => Ok(Installed::Reinstalled {
                package,
                state: report.final_state(),
            }),
            RecoveryOutcome::RestoredPrevious { reason } => {
                self.shell.status(
                    Status::Restored,
                    format!("previous `{}` on {}", package, device.serial()),
                );
                Err(DeployError::RecoveredPrevious { package, reason })
            }
        }
    }

    fn push_expansions(&self, device: &Device<'_>, expansions: &[Expansion]) -> DeployResult<()> {
        for expansion in expansions {
            let name = file_name_str(&expansion.file);
            let remote = format!(
                "{}/{}",
                EXTERNAL_STORAGE_ROOT,
                expansion.install_path.trim_start_matches('/')
            );

            let output = {
                let _spinner = self
                    .shell
                    .spinner(Status::Pushing, format!("{} to {}", name, remote));
                device.push(&expansion.file, &remote)?
            };
            if !output.success() {
                return Err(DeployError::ExpansionFailed {
                    file: name,
                    reason: output.combined().trim().to_string(),
                });
            }
            info!(serial = device.serial(), file = %name, %remote, "expansion pushed");
        }
        Ok(())
    }

    fn record(&self, report: &mut BatchReport, item: ItemReport) {
        let label = file_name_str(&item.source);
        let target = item.serial.as_deref().unwrap_or("no device");
        match &item.outcome {
            Ok(Installed::Reinstalled { .. }) => self.shell.status(
                Status::Installed,
                format!("{} on {} after a keep-data reinstall", label, target),
            ),
            Ok(_) => self
                .shell
                .status(Status::Installed, format!("{} on {}", label, target)),
            Err(err) => self.shell.diagnostic(&err.to_diagnostic()),
        }
        report.items.push(item);
    }
}

/// Reject expansions that cannot be placed before anything is installed.
fn check_expansions(expansions: &[Expansion]) -> DeployResult<()> {
    match expansions
        .iter()
        .find(|e| e.install_location != EXTERNAL_STORAGE)
    {
        Some(expansion) => Err(DeployError::ExpansionFailed {
            file: file_name_str(&expansion.file),
            reason: format!(
                "install location `{}` is not supported, only {}",
                expansion.install_location, EXTERNAL_STORAGE
            ),
        }),
        None => Ok(()),
    }
}
