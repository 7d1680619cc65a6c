//! Configuration file support for apkdeploy.
//!
//! Configuration is layered, later sources taking precedence:
//! - Global: `<config dir>/apkdeploy/config.toml`
//! - Project: `./apkdeploy.toml`, or the legacy `./config.yaml` signing file
//! - Explicit: `--config <FILE>`
//!
//! `[tools]`, `[policy]`, `[signing]` and `[backup]` merge field by field;
//! `[density]` and `[resolver]` replace the whole section.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::core::device::DensityPolicy;
use crate::core::error::{DeployError, DeployResult};
use crate::util::process::resolve_tool;

/// Project-level configuration file names, in lookup order.
pub const PROJECT_CONFIG_NAMES: &[&str] = &["apkdeploy.toml", "config.yaml", "config.yml"];

/// apkdeploy configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External tool locations
    pub tools: ToolsConfig,

    /// Density bucket table; `None` keeps the built-in table
    pub density: Option<DensityPolicy>,

    /// Split classification lists; `None` keeps the built-in lists
    pub resolver: Option<ResolverConfig>,

    /// Confirmation and recovery policy
    pub policy: PolicyConfig,

    /// Keystore for bundletool builds
    pub signing: SigningConfig,

    /// Backup location for keep-data reinstalls
    pub backup: BackupConfig,
}

/// Paths to external tools. Unset tools are looked up on PATH.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub adb: Option<PathBuf>,
    pub aapt: Option<PathBuf>,
    pub java: Option<PathBuf>,
    /// Path to `bundletool.jar`
    pub bundletool: Option<PathBuf>,
}

/// Resolved tool locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
    pub adb: PathBuf,
    pub aapt: PathBuf,
    pub java: PathBuf,
    pub bundletool: PathBuf,
}

impl ToolsConfig {
    /// Configured value, then PATH, then the bare program name.
    pub fn resolve(&self) -> Tools {
        Tools {
            adb: resolve_tool(self.adb.as_deref(), "adb"),
            aapt: resolve_tool(self.aapt.as_deref(), "aapt"),
            java: resolve_tool(self.java.as_deref(), "java"),
            bundletool: self
                .bundletool
                .clone()
                .unwrap_or_else(|| PathBuf::from("bundletool.jar")),
        }
    }
}

/// Language and feature lists used to classify split names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Languages eligible as a fallback when nothing matches the device
    pub fallback_languages: Vec<String>,

    /// Optional feature splits that are never installed automatically
    pub excluded_features: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        ResolverConfig {
            fallback_languages: list(&[
                "ar", "bn", "de", "en", "et", "es", "fr", "hi", "in", "it", "ja", "ko", "ms",
                "my", "nl", "pt", "ru", "sv", "th", "tl", "tr", "vi", "zh",
            ]),
            excluded_features: list(&["extra_icu", "feedv2", "vr", "chime"]),
        }
    }
}

/// Whether the keep-data reinstall may be offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryMode {
    #[default]
    Ask,
    Never,
}

/// Confirmation and recovery policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Re-ask the version/ABI gate before the reinstall inside recovery
    pub confirm_version_on_recovery: Option<bool>,

    /// Answer yes to every confirmation
    pub assume_yes: Option<bool>,

    pub recovery: Option<RecoveryMode>,
}

impl PolicyConfig {
    pub fn confirm_version_on_recovery(&self) -> bool {
        self.confirm_version_on_recovery.unwrap_or(false)
    }

    pub fn assume_yes(&self) -> bool {
        self.assume_yes.unwrap_or(false)
    }

    pub fn recovery(&self) -> RecoveryMode {
        self.recovery.unwrap_or_default()
    }
}

/// Keystore settings for `bundletool build-apks`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// `/path/to/keystore.jks`
    pub ks: Option<String>,

    /// `pass:password` or `file:/path/to/keystore.pwd`
    #[serde(alias = "ks-pass")]
    pub ks_pass: Option<String>,

    #[serde(alias = "ks-key-alias")]
    pub ks_key_alias: Option<String>,

    /// `pass:password` or `file:/path/to/key.pwd`
    #[serde(alias = "key-pass")]
    pub key_pass: Option<String>,
}

/// A complete, validated keystore configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningKey {
    pub ks: String,
    pub ks_pass: String,
    pub ks_key_alias: String,
    pub key_pass: String,
}

impl SigningKey {
    /// bundletool `--ks*` flags.
    pub fn bundletool_args(&self) -> Vec<String> {
        vec![
            format!("--ks={}", self.ks),
            format!("--ks-pass={}", self.ks_pass),
            format!("--ks-key-alias={}", self.ks_key_alias),
            format!("--key-pass={}", self.key_pass),
        ]
    }
}

impl SigningConfig {
    /// All four fields, or none of them.
    pub fn validate(&self) -> DeployResult<Option<SigningKey>> {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        let fields = [
            ("ks", &self.ks),
            ("ks_pass", &self.ks_pass),
            ("ks_key_alias", &self.ks_key_alias),
            ("key_pass", &self.key_pass),
        ];
        let missing: Vec<&'static str> = fields
            .iter()
            .filter(|(_, v)| !present(v))
            .map(|(name, _)| *name)
            .collect();

        if missing.len() == fields.len() {
            return Ok(None);
        }
        if !missing.is_empty() {
            return Err(DeployError::InvalidSigningConfig { missing });
        }

        let take = |v: &Option<String>| v.clone().unwrap_or_default();
        Ok(Some(SigningKey {
            ks: take(&self.ks),
            ks_pass: take(&self.ks_pass),
            ks_key_alias: take(&self.ks_key_alias),
            key_pass: take(&self.key_pass),
        }))
    }

    fn merge(&mut self, other: SigningConfig) {
        if other.ks.is_some() {
            self.ks = other.ks;
        }
        if other.ks_pass.is_some() {
            self.ks_pass = other.ks_pass;
        }
        if other.ks_key_alias.is_some() {
            self.ks_key_alias = other.ks_key_alias;
        }
        if other.key_pass.is_some() {
            self.key_pass = other.key_pass;
        }
    }
}

/// Backup location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Root directory for backups; defaults to the platform data dir
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file, TOML or YAML by extension.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml {
            Self::from_yaml(&contents)
                .with_context(|| format!("failed to parse config file: {}", path.display()))
        } else {
            toml::from_str(&contents)
                .with_context(|| format!("failed to parse config file: {}", path.display()))
        }
    }

    /// Parse YAML; a document with top-level `ks` keys is a legacy signing file.
    fn from_yaml(contents: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(contents)?;
        if value.is_null() {
            return Ok(Config::default());
        }
        if value.get("ks").is_some() {
            let signing: SigningConfig = serde_yaml::from_value(value)?;
            return Ok(Config {
                signing,
                ..Config::default()
            });
        }
        Ok(serde_yaml::from_value(value)?)
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.tools.adb.is_some() {
            self.tools.adb = other.tools.adb;
        }
        if other.tools.aapt.is_some() {
            self.tools.aapt = other.tools.aapt;
        }
        if other.tools.java.is_some() {
            self.tools.java = other.tools.java;
        }
        if other.tools.bundletool.is_some() {
            self.tools.bundletool = other.tools.bundletool;
        }

        if other.density.is_some() {
            self.density = other.density;
        }
        if other.resolver.is_some() {
            self.resolver = other.resolver;
        }

        if other.policy.confirm_version_on_recovery.is_some() {
            self.policy.confirm_version_on_recovery = other.policy.confirm_version_on_recovery;
        }
        if other.policy.assume_yes.is_some() {
            self.policy.assume_yes = other.policy.assume_yes;
        }
        if other.policy.recovery.is_some() {
            self.policy.recovery = other.policy.recovery;
        }

        self.signing.merge(other.signing);

        if other.backup.dir.is_some() {
            self.backup.dir = other.backup.dir;
        }
    }

    /// The density table in effect.
    pub fn density_policy(&self) -> DensityPolicy {
        self.density.clone().unwrap_or_default()
    }

    /// The classification lists in effect.
    pub fn resolver_config(&self) -> ResolverConfig {
        self.resolver.clone().unwrap_or_default()
    }

    /// Check the parts of the configuration that are used unconditionally.
    pub fn validate(&self) -> Result<()> {
        self.density_policy()
            .validate()
            .context("invalid [density] configuration")
    }

    /// Root directory for keep-data reinstall backups.
    pub fn backup_root(&self) -> PathBuf {
        self.backup
            .dir
            .clone()
            .or_else(|| project_dirs().map(|d| d.data_dir().join("backups")))
            .unwrap_or_else(|| std::env::temp_dir().join("apkdeploy-backups"))
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "apkdeploy")
}

/// Global configuration file (`<config dir>/apkdeploy/config.toml`).
pub fn global_config_path() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().join("config.toml"))
}

/// First project configuration file present in `dir`.
pub fn project_config_path(dir: &Path) -> Option<PathBuf> {
    PROJECT_CONFIG_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

/// Load merged configuration from global, project and explicit locations.
///
/// Order of precedence (highest to lowest):
/// 1. Explicit `--config` file (must exist and parse)
/// 2. Project config
/// 3. Global config
/// 4. Defaults
pub fn load_config(
    global_path: Option<&Path>,
    project_dir: &Path,
    explicit: Option<&Path>,
) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global) = global_path {
        config.merge(Config::load_or_default(global));
    }

    if let Some(project) = project_config_path(project_dir) {
        config.merge(Config::load_or_default(&project));
    }

    if let Some(explicit) = explicit {
        config.merge(Config::load(explicit)?);
    }

    config.validate()?;
    Ok(config)
}
