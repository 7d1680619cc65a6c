//! Turns an input path into something installable.
//!
//! Archives are unpacked into a working directory owned by the returned
//! [`LoadedPackage`]; it is removed when the package is dropped.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use tempfile::TempDir;
use tracing::debug;

use crate::core::error::{DeployError, DeployResult};
use crate::core::package::{
    Expansion, PackageDescriptor, PackageKind, SplitClassifier, VariantEntry,
};
use crate::ops::inspect::inspect_apk;
use crate::util::archive;
use crate::util::fs::read_to_string;

/// What the orchestrator does with a loaded package.
#[derive(Debug)]
pub enum Payload {
    /// Resolve variants per device and install through adb.
    Descriptor(PackageDescriptor),
    /// Install a prebuilt `.apks` set with bundletool.
    Apks(PathBuf),
    /// Build a device-specific `.apks` from an app bundle, then install it.
    Aab(PathBuf),
}

#[derive(Debug)]
pub struct LoadedPackage {
    pub source: PathBuf,
    pub kind: PackageKind,
    pub payload: Payload,
    workspace: Option<TempDir>,
}

impl LoadedPackage {
    /// Wrap an already built descriptor that needs no working directory.
    pub fn from_descriptor(source: impl Into<PathBuf>, descriptor: PackageDescriptor) -> Self {
        let kind = if descriptor.split {
            PackageKind::Xapk
        } else {
            PackageKind::Apk
        };
        LoadedPackage {
            source: source.into(),
            kind,
            payload: Payload::Descriptor(descriptor),
            workspace: None,
        }
    }

    /// Scratch directory for this item, when one was created.
    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_ref().map(TempDir::path)
    }

    /// Package name, when known before installing.
    pub fn package_name(&self) -> Option<&str> {
        match &self.payload {
            Payload::Descriptor(d) => Some(&d.package_name),
            Payload::Apks(_) | Payload::Aab(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct XapkManifest {
    package_name: String,
    #[serde(deserialize_with = "number_or_string")]
    version_code: u64,
    #[serde(deserialize_with = "number_or_string")]
    min_sdk_version: u64,
    #[serde(default, deserialize_with = "opt_number_or_string")]
    target_sdk_version: Option<u64>,
    #[serde(default)]
    split_apks: Vec<XapkSplit>,
    #[serde(default)]
    expansions: Vec<XapkExpansion>,
}

#[derive(Debug, Deserialize)]
struct XapkSplit {
    file: String,
    id: String,
}

#[derive(Debug, Deserialize)]
struct XapkExpansion {
    file: String,
    install_location: String,
    install_path: String,
}

#[derive(Debug, Deserialize)]
struct ApkmInfo {
    pname: String,
    #[serde(deserialize_with = "number_or_string")]
    versioncode: u64,
    #[serde(deserialize_with = "number_or_string")]
    min_api: u64,
    #[serde(default, deserialize_with = "opt_number_or_string")]
    target_api: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

impl NumberOrString {
    fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::String(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("expected a number, found `{}`", s))),
        }
    }
}

fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    NumberOrString::deserialize(deserializer)?.into_u64()
}

fn opt_number_or_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u64>, D::Error> {
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::String(s)) if s.trim().is_empty() => Ok(None),
        Some(value) => value.into_u64().map(Some),
    }
}

fn sdk(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

pub struct PackageLoader {
    classifier: SplitClassifier,
    aapt: PathBuf,
}

impl PackageLoader {
    pub fn new(classifier: SplitClassifier, aapt: impl Into<PathBuf>) -> Self {
        PackageLoader {
            classifier,
            aapt: aapt.into(),
        }
    }

    pub fn load(&self, path: &Path) -> DeployResult<LoadedPackage> {
        if !path.exists() {
            return Err(DeployError::Other(anyhow::anyhow!(
                "`{}` does not exist",
                path.display()
            )));
        }
        let kind = PackageKind::detect(path)?;
        debug!(path = %path.display(), %kind, "loading package");

        let (payload, workspace) = match kind {
            PackageKind::Apk => {
                let info = inspect_apk(&self.aapt, path)?;
                (Payload::Descriptor(info.into_descriptor(path)), None)
            }
            PackageKind::Xapk if path.is_dir() => (Payload::Descriptor(self.load_xapk_dir(path)?), None),
            PackageKind::Xapk => {
                let workspace = new_workspace()?;
                archive::extract_all(path, workspace.path())?;
                let descriptor = self.load_xapk_dir(workspace.path())?;
                (Payload::Descriptor(descriptor), Some(workspace))
            }
            PackageKind::Apkm => {
                let workspace = new_workspace()?;
                let descriptor = self.load_apkm(path, workspace.path())?;
                (Payload::Descriptor(descriptor), Some(workspace))
            }
            PackageKind::Apks => (Payload::Apks(path.to_path_buf()), None),
            PackageKind::Aab => (Payload::Aab(path.to_path_buf()), Some(new_workspace()?)),
        };

        if let Payload::Descriptor(descriptor) = &payload {
            descriptor.validate(path)?;
        }

        Ok(LoadedPackage {
            source: path.to_path_buf(),
            kind,
            payload,
            workspace,
        })
    }

    /// Read `manifest.json` of an unpacked xapk.
    pub fn load_xapk_dir(&self, dir: &Path) -> DeployResult<PackageDescriptor> {
        let manifest_path = dir.join("manifest.json");
        let text = read_to_string(&manifest_path)?;
        let manifest: XapkManifest =
            serde_json::from_str(&text).map_err(|e| DeployError::InvalidDescriptor {
                path: manifest_path.clone(),
                reason: e.to_string(),
            })?;

        if !manifest.expansions.is_empty() {
            let apk = dir.join(format!("{}.apk", manifest.package_name));
            let info = inspect_apk(&self.aapt, &apk)?;
            let mut descriptor = info.into_descriptor(apk);
            descriptor.expansions = manifest
                .expansions
                .into_iter()
                .map(|e| Expansion {
                    file: dir.join(e.file),
                    install_location: e.install_location,
                    install_path: e.install_path,
                })
                .collect();
            return Ok(descriptor);
        }

        if manifest.split_apks.is_empty() {
            return Err(DeployError::InvalidDescriptor {
                path: manifest_path,
                reason: "neither `split_apks` nor `expansions` is present".into(),
            });
        }

        let entries = manifest
            .split_apks
            .iter()
            .map(|split| {
                let (category, key) = self.classifier.classify(&split.id);
                VariantEntry::new(category, key, dir.join(&split.file))
            })
            .collect();

        Ok(PackageDescriptor {
            package_name: manifest.package_name,
            version_code: manifest.version_code,
            min_sdk: sdk(manifest.min_sdk_version),
            target_sdk: manifest.target_sdk_version.map(sdk),
            native_code: Vec::new(),
            split: true,
            entries,
            expansions: Vec::new(),
        })
    }

    fn load_apkm(&self, path: &Path, dest: &Path) -> DeployResult<PackageDescriptor> {
        let invalid = |reason: String| DeployError::InvalidDescriptor {
            path: path.to_path_buf(),
            reason,
        };

        let raw = archive::read_entry(path, "info.json")?
            .ok_or_else(|| invalid("missing info.json".into()))?;
        let info: ApkmInfo = serde_json::from_slice(&raw).map_err(|e| invalid(e.to_string()))?;

        let names: Vec<String> = archive::entry_names(path)?
            .into_iter()
            .filter(|n| !n.contains('/') && n.to_ascii_lowercase().ends_with(".apk"))
            .collect();
        if names.is_empty() {
            return Err(invalid("the archive holds no apk files".into()));
        }
        archive::extract_all(path, dest)?;

        let entries = names
            .iter()
            .map(|name| {
                let (category, key) = self.classifier.classify_file(name);
                VariantEntry::new(category, key, dest.join(name))
            })
            .collect();

        Ok(PackageDescriptor {
            package_name: info.pname,
            version_code: info.versioncode,
            min_sdk: sdk(info.min_api),
            target_sdk: info.target_api.map(sdk),
            native_code: Vec::new(),
            split: true,
            entries,
            expansions: Vec::new(),
        })
    }
}

fn new_workspace() -> DeployResult<TempDir> {
    tempfile::Builder::new()
        .prefix("apkdeploy-")
        .tempdir()
        .map_err(|e| DeployError::Other(anyhow::Error::new(e).context("failed to create a working directory")))
}
