//! Variant resolution.
//!
//! The resolver is pure and deterministic: it maps a [`DeviceSnapshot`] and a
//! [`PackageDescriptor`] to the ordered list of files to install. All device
//! I/O happens before resolution.

pub mod compat;

pub use compat::check_compatibility;

use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;

use crate::core::device::{language_of, DensityBucket, DensityPolicy, DeviceSnapshot};
use crate::core::error::{DeployError, DeployResult};
use crate::core::package::{normalize_abi, PackageDescriptor, VariantCategory, VariantEntry};

/// Outcome of resolving one package for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Files to install, unconditional entries first.
    pub files: Vec<PathBuf>,
    /// The entries behind `files`, in the same order.
    pub selected: Vec<VariantEntry>,
    /// Non-fatal notes such as a language fallback.
    pub warnings: Vec<String>,
    /// Device ABI the install set targets, when the package has native code.
    pub primary_abi: Option<String>,
}

/// Selects the variant files a device needs.
#[derive(Debug, Clone)]
pub struct VariantResolver<'p> {
    density: &'p DensityPolicy,
}

impl<'p> VariantResolver<'p> {
    pub fn new(density: &'p DensityPolicy) -> Self {
        VariantResolver { density }
    }

    /// Compute the install set.
    ///
    /// The result holds every base entry plus at most one ABI, one density
    /// and one language entry. Feature-excluded entries are never selected.
    pub fn resolve(
        &self,
        device: &DeviceSnapshot,
        package: &PackageDescriptor,
    ) -> DeployResult<Resolution> {
        let mut selected: Vec<VariantEntry> = package
            .entries_of(VariantCategory::Base)
            .cloned()
            .collect();
        let mut warnings = Vec::new();

        let (abi_entry, primary_abi) = self.select_abi(device, package)?;
        selected.extend(abi_entry);

        if let Some(entry) = self.select_density(device.density_bucket, package) {
            selected.push(entry);
        }

        if package.split {
            if let Some(entry) = select_language(&device.locale, package, &mut warnings) {
                selected.push(entry);
            }
        }

        debug!(
            package = %package.package_name,
            serial = %device.serial,
            files = selected.len(),
            "resolved install set"
        );

        Ok(Resolution {
            files: selected.iter().map(|e| e.file.clone()).collect(),
            selected,
            warnings,
            primary_abi,
        })
    }

    fn select_abi(
        &self,
        device: &DeviceSnapshot,
        package: &PackageDescriptor,
    ) -> DeployResult<(Option<VariantEntry>, Option<String>)> {
        let mismatch = || DeployError::AbiMismatch {
            serial: device.serial.clone(),
            device_abis: device.abi_list.clone(),
            package_abis: package.package_abis(),
        };

        if package.has_abi_entries() {
            for abi in &device.abi_list {
                let key = normalize_abi(abi);
                if let Some(entry) = package
                    .entries_of(VariantCategory::Abi)
                    .find(|e| e.key == key)
                {
                    return Ok((Some(entry.clone()), Some(abi.clone())));
                }
            }
            return Err(mismatch());
        }

        if package.native_code.is_empty() {
            return Ok((None, None));
        }
        device
            .abi_list
            .iter()
            .find(|abi| package.native_code.contains(&normalize_abi(abi)))
            .map(|abi| (None, Some(abi.clone())))
            .ok_or_else(mismatch)
    }

    fn select_density(
        &self,
        bucket: DensityBucket,
        package: &PackageDescriptor,
    ) -> Option<VariantEntry> {
        let find = |b: DensityBucket| {
            package
                .entries_of(VariantCategory::Density)
                .find(|e| e.key == b.as_str())
                .cloned()
        };

        find(bucket).or_else(|| {
            self.density
                .fallback_order
                .iter()
                .find_map(|b| find(*b))
        })
    }
}

fn select_language(
    device_locale: &str,
    package: &PackageDescriptor,
    warnings: &mut Vec<String>,
) -> Option<VariantEntry> {
    let device_lang = language_of(device_locale);
    let languages: Vec<&VariantEntry> = package.entries.iter().filter(|e| e.is_language()).collect();

    if let Some(entry) = languages.iter().find(|e| language_of(&e.key) == device_lang) {
        return Some((*entry).clone());
    }

    if languages.is_empty() {
        warnings.push(format!(
            "`{}` has no language splits; none installed",
            package.package_name
        ));
        return None;
    }

    match languages
        .iter()
        .find(|e| e.category == VariantCategory::LanguageFallback)
    {
        Some(entry) => {
            warnings.push(format!(
                "no language split matches device language `{}`; installing `{}` instead",
                device_lang, entry.key
            ));
            Some((*entry).clone())
        }
        None => {
            warnings.push(format!(
                "no language split matches device language `{}`; none installed",
                device_lang
            ));
            None
        }
    }
}
