//! Command implementations

pub mod completions;
pub mod doctor;
pub mod install;
pub mod profile;
pub mod resolve;

use std::io::IsTerminal;

use anyhow::{Context as _, Result};

use apkdeploy::adb::{usable_devices, AdbChannel};
use apkdeploy::core::{DeployError, SplitClassifier};
use apkdeploy::ops::PackageLoader;
use apkdeploy::util::config::{global_config_path, load_config, Config, Tools};
use apkdeploy::util::prompt::{AssumeNo, AssumeYes, InquirePrompter, Prompter};
use apkdeploy::util::Shell;

use crate::cli::GlobalArgs;

/// Loaded configuration and tool paths shared by every command.
pub struct Context<'s> {
    pub shell: &'s Shell,
    pub config: Config,
    pub tools: Tools,
}

impl<'s> Context<'s> {
    pub fn new(global: &GlobalArgs, shell: &'s Shell) -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to read the current directory")?;
        let config = load_config(
            global_config_path().as_deref(),
            &cwd,
            global.config.as_deref(),
        )?;

        let mut tools = config.tools.resolve();
        if let Some(adb) = &global.adb {
            tools.adb = adb.clone();
        }

        Ok(Context {
            shell,
            config,
            tools,
        })
    }

    pub fn channel(&self) -> AdbChannel {
        AdbChannel::new(&self.tools.adb)
    }

    /// `--yes` and `policy.assume_yes` answer for the user; without a
    /// terminal every question is declined.
    pub fn prompter(&self, assume_yes: bool) -> Box<dyn Prompter> {
        if assume_yes || self.config.policy.assume_yes() {
            Box::new(AssumeYes)
        } else if std::io::stdin().is_terminal() {
            Box::new(InquirePrompter)
        } else {
            Box::new(AssumeNo)
        }
    }

    pub fn loader(&self) -> PackageLoader {
        let resolver = self.config.resolver_config();
        PackageLoader::new(
            SplitClassifier::new(resolver.fallback_languages, resolver.excluded_features),
            &self.tools.aapt,
        )
    }

    /// Usable serials, narrowed to `device` when given. No confirmation.
    pub fn devices(&self, device: Option<&str>) -> Result<Vec<String>> {
        let serials = usable_devices(&self.channel())?;
        match device {
            Some(wanted) if serials.iter().any(|s| s == wanted) => Ok(vec![wanted.to_string()]),
            Some(wanted) => anyhow::bail!("device `{}` is not connected", wanted),
            None if serials.is_empty() => Err(DeployError::NoDevices.into()),
            None => Ok(serials),
        }
    }
}
