//! Drives the platform installer down the flag ladder.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info};

use crate::adb::Device;
use crate::core::error::{DeployError, DeployResult};
use crate::core::package::normalize_abi;
use crate::install::flags::{FlagState, InstallAttempt, InstallFailure, Step};
use crate::install::session::install_with_session;
use crate::util::prompt::Prompter;

/// What to install on one device.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub package_name: String,
    pub version_code: u64,
    pub files: Vec<PathBuf>,
    /// Device ABI the files target, when the package has native code.
    pub abi: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct InstallOptions {
    /// Ask before replacing an equal or newer version, or a different ABI.
    pub confirm_existing: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        InstallOptions {
            confirm_existing: true,
        }
    }
}

/// One installer invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub state: FlagState,
    pub flags: Vec<String>,
    pub failure: Option<InstallFailure>,
}

/// Every attempt of a successful install, in order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallReport {
    pub attempts: Vec<AttemptRecord>,
}

impl InstallReport {
    /// Flag level that finally succeeded.
    pub fn final_state(&self) -> Option<FlagState> {
        self.attempts.last().map(|a| a.state)
    }
}

pub struct InstallExecutor<'a> {
    device: &'a Device<'a>,
    prompter: &'a dyn Prompter,
}

impl<'a> InstallExecutor<'a> {
    pub fn new(device: &'a Device<'a>, prompter: &'a dyn Prompter) -> Self {
        InstallExecutor { device, prompter }
    }

    /// Install `request`, degrading flags on known rejections.
    ///
    /// A declined replacement prompt returns before any install command.
    pub fn install(
        &self,
        request: &InstallRequest,
        options: InstallOptions,
    ) -> DeployResult<InstallReport> {
        if options.confirm_existing {
            self.confirm_replacement(request)?;
        }

        let mut attempt = InstallAttempt::new();
        let mut report = InstallReport::default();

        loop {
            let state = attempt.state();
            let flags = attempt.flags();
            attempt.begin();
            debug!(
                serial = self.device.serial(),
                package = %request.package_name,
                state = %state,
                flags = %flags.join(" "),
                "install attempt"
            );

            let output = if state == FlagState::SessionFallback {
                install_with_session(self.device, &request.files, attempt.test_flag())?
            } else {
                self.device.install(&flags, &request.files)?
            };

            let failure = InstallFailure::classify(&output);
            report.attempts.push(AttemptRecord {
                state,
                flags: flags.iter().map(|f| f.to_string()).collect(),
                failure,
            });

            let Some(failure) = failure else {
                return Ok(report);
            };

            match attempt.fail(failure) {
                Step::Retry => {
                    info!(
                        serial = self.device.serial(),
                        "{} at {} flags; retrying at {}",
                        failure.describe(),
                        state,
                        attempt.state()
                    );
                }
                Step::Rejected(failure) => {
                    return Err(DeployError::InstallRejected {
                        package: request.package_name.clone(),
                        reason: failure.describe().to_string(),
                        output: output.combined(),
                    });
                }
                Step::Exhausted => {
                    return Err(DeployError::InstallFailedGeneric {
                        package: request.package_name.clone(),
                        serial: self.device.serial().to_string(),
                        output: output.combined(),
                    });
                }
            }
        }
    }

    fn confirm_replacement(&self, request: &InstallRequest) -> DeployResult<()> {
        let Some(installed) = self.device.installed_package(&request.package_name)? else {
            return Ok(());
        };

        if request.version_code <= installed.version_code {
            let relation = if request.version_code == installed.version_code {
                "the same version"
            } else {
                "a newer version"
            };
            let question = format!(
                "`{}` {} ({}) is installed on {} and would be replaced by version {}. Continue?",
                request.package_name,
                relation,
                installed.version_code,
                self.device.serial(),
                request.version_code
            );
            if !self.prompter.confirm(&question, false)? {
                return Err(DeployError::VersionDowngradeOrSameUnconfirmed {
                    package: request.package_name.clone(),
                    installed: installed.version_code,
                    candidate: request.version_code,
                });
            }
        }

        if let (Some(installed_abi), Some(candidate_abi)) = (&installed.primary_abi, &request.abi) {
            if normalize_abi(installed_abi) != normalize_abi(candidate_abi) {
                let question = format!(
                    "`{}` is installed for {} and the new files target {}. Continue?",
                    request.package_name, installed_abi, candidate_abi
                );
                if !self.prompter.confirm(&question, false)? {
                    return Err(DeployError::AbiChangeUnconfirmed {
                        package: request.package_name.clone(),
                        installed_abi: installed_abi.clone(),
                        candidate_abi: candidate_abi.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}
