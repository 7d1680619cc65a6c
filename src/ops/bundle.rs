//! bundletool flows for `.apks` and `.aab` packages.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::core::error::{DeployError, DeployResult};
use crate::util::config::SigningKey;
use crate::util::fs::file_name_str;
use crate::util::process::ProcessBuilder;

/// `java -jar bundletool.jar ...` runner.
#[derive(Debug, Clone)]
pub struct BundleTool {
    java: PathBuf,
    jar: PathBuf,
}

impl BundleTool {
    pub fn new(java: impl Into<PathBuf>, jar: impl Into<PathBuf>) -> Self {
        BundleTool {
            java: java.into(),
            jar: jar.into(),
        }
    }

    fn command(&self) -> ProcessBuilder {
        ProcessBuilder::new(&self.java).arg("-jar").arg(&self.jar)
    }

    pub fn install_apks_command(&self, apks: &Path, serial: &str) -> ProcessBuilder {
        self.command()
            .arg("install-apks")
            .arg(format!("--apks={}", apks.display()))
            .arg(format!("--device-id={}", serial))
    }

    pub fn build_apks_command(
        &self,
        bundle: &Path,
        serial: &str,
        output: &Path,
        signing: Option<&SigningKey>,
    ) -> ProcessBuilder {
        let mut cmd = self
            .command()
            .arg("build-apks")
            .arg("--connected-device")
            .arg(format!("--device-id={}", serial))
            .arg(format!("--bundle={}", bundle.display()))
            .arg(format!("--output={}", output.display()));
        if let Some(key) = signing {
            cmd = cmd.args(key.bundletool_args());
        }
        cmd
    }

    /// Install an `.apks` set on one device.
    pub fn install_apks(&self, apks: &Path, serial: &str) -> DeployResult<()> {
        run(self.install_apks_command(apks, serial))
    }

    /// Build the `.apks` for one connected device into `out_dir`.
    pub fn build_apks(
        &self,
        bundle: &Path,
        serial: &str,
        out_dir: &Path,
        signing: Option<&SigningKey>,
    ) -> DeployResult<PathBuf> {
        let stem = file_name_str(bundle);
        let stem = stem.rsplit_once('.').map(|(s, _)| s).unwrap_or(&stem);
        let output = out_dir.join(format!("{}-{}.apks", stem, serial.replace(':', "_")));
        if signing.is_none() {
            info!("no signing key configured; bundletool signs with its debug key");
        }
        run(self.build_apks_command(bundle, serial, &output, signing))?;
        Ok(output)
    }
}

fn run(cmd: ProcessBuilder) -> DeployResult<()> {
    let output = cmd.exec().map_err(|e| DeployError::BundleToolFailed {
        output: format!("{:#}", e),
    })?;
    if !output.status.success() {
        let mut text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(stderr.trim());
        }
        return Err(DeployError::BundleToolFailed { output: text });
    }
    Ok(())
}
