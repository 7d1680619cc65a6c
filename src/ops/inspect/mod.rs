//! Package introspection: `aapt dump badging`, with a fallback that reads
//! the apk's compiled manifest directly.

pub mod axml;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::package::PackageDescriptor;
use crate::util::archive;
use crate::util::process::ProcessBuilder;

use self::axml::{parse_elements, AttrValue};

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'([^']*)'").expect("static regex"));
static PACKAGE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bname='([^']*)'").expect("static regex"));
static BADGING_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bversionCode='(\d*)'").expect("static regex"));

const VERSION_CODE_ID: u32 = 0x0101_021b;
const MIN_SDK_ID: u32 = 0x0101_020c;
const TARGET_SDK_ID: u32 = 0x0101_0270;

/// Install-relevant facts about one apk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApkInfo {
    pub package_name: String,
    pub version_code: u64,
    pub min_sdk: u32,
    pub target_sdk: Option<u32>,
    pub native_code: Vec<String>,
}

impl ApkInfo {
    pub fn into_descriptor(self, file: impl Into<PathBuf>) -> PackageDescriptor {
        PackageDescriptor::monolithic(
            self.package_name,
            self.version_code,
            self.min_sdk,
            self.target_sdk,
            self.native_code,
            file,
        )
    }
}

/// Parse `aapt dump badging` output.
pub fn parse_badging(output: &str) -> Result<ApkInfo> {
    let mut package_name = None;
    let mut version_code = 0;
    let mut min_sdk = None;
    let mut target_sdk = None;
    let mut native_code = Vec::new();

    for line in output.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("package:") {
            package_name = PACKAGE_NAME.captures(rest).map(|c| c[1].to_string());
            version_code = BADGING_VERSION
                .captures(rest)
                .and_then(|c| c[1].parse().ok())
                .unwrap_or(0);
        } else if let Some(rest) = line.strip_prefix("sdkVersion:") {
            min_sdk = first_quoted(rest).and_then(|v| v.parse().ok());
        } else if let Some(rest) = line.strip_prefix("targetSdkVersion:") {
            target_sdk = first_quoted(rest).and_then(|v| v.parse().ok());
        } else if let Some(rest) = line.strip_prefix("native-code:") {
            native_code.extend(QUOTED.captures_iter(rest).map(|c| c[1].to_string()));
        }
    }

    let Some(package_name) = package_name.filter(|n| !n.is_empty()) else {
        bail!("aapt output has no `package: name=` line");
    };

    Ok(ApkInfo {
        package_name,
        version_code,
        min_sdk: min_sdk.unwrap_or(1),
        target_sdk,
        native_code,
    })
}

fn first_quoted(s: &str) -> Option<&str> {
    QUOTED.captures(s).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Inspect an apk with aapt, falling back to its compiled manifest.
pub fn inspect_apk(aapt: &Path, apk: &Path) -> Result<ApkInfo> {
    let badging = ProcessBuilder::new(aapt)
        .args(["dump", "badging"])
        .arg(apk)
        .exec();

    match badging {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            match parse_badging(&stdout) {
                Ok(info) => return Ok(info),
                Err(err) => warn!("could not parse aapt output for {}: {:#}", apk.display(), err),
            }
        }
        Ok(output) => warn!(
            status = ?output.status.code(),
            "aapt failed on {}; reading the manifest directly",
            apk.display()
        ),
        Err(err) => warn!("aapt is unavailable ({:#}); reading the manifest directly", err),
    }

    inspect_archive(apk)
}

/// Read package facts from the apk's `AndroidManifest.xml` and `lib/` entries.
pub fn inspect_archive(apk: &Path) -> Result<ApkInfo> {
    let manifest = archive::read_entry(apk, "AndroidManifest.xml")?
        .with_context(|| format!("{} has no AndroidManifest.xml", apk.display()))?;
    let elements = parse_elements(&manifest)
        .with_context(|| format!("failed to decode the manifest of {}", apk.display()))?;

    let root = elements
        .iter()
        .find(|e| e.name == "manifest")
        .with_context(|| format!("{} has no <manifest> element", apk.display()))?;
    let package_name = root
        .attr("package", None)
        .and_then(AttrValue::as_str)
        .filter(|n| !n.is_empty())
        .with_context(|| format!("{} has no package name", apk.display()))?
        .to_string();
    let version_code = root
        .attr("versionCode", Some(VERSION_CODE_ID))
        .and_then(AttrValue::as_u32)
        .unwrap_or(0) as u64;

    let uses_sdk = elements.iter().find(|e| e.name == "uses-sdk");
    let sdk_attr = |name: &str, id: u32| {
        uses_sdk
            .and_then(|e| e.attr(name, Some(id)))
            .and_then(AttrValue::as_u32)
    };
    let min_sdk = sdk_attr("minSdkVersion", MIN_SDK_ID).unwrap_or(1);
    let target_sdk = sdk_attr("targetSdkVersion", TARGET_SDK_ID);
    if target_sdk.is_none() {
        debug!(package = %package_name, "manifest declares no targetSdkVersion");
    }

    let native_code = native_code_of(&archive::entry_names(apk)?);

    Ok(ApkInfo {
        package_name,
        version_code,
        min_sdk,
        target_sdk,
        native_code,
    })
}

/// ABI directories under `lib/`, sorted.
pub fn native_code_of(entry_names: &[String]) -> Vec<String> {
    entry_names
        .iter()
        .filter_map(|name| {
            let mut parts = name.strip_prefix("lib/")?.split('/');
            let abi = parts.next()?;
            parts.next()?;
            (!abi.is_empty()).then(|| abi.to_string())
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
