//! Package descriptor - the normalized view of an installable package.
//!
//! Whatever the on-disk format, a package is reduced to a
//! [`PackageDescriptor`]: identity, SDK bounds, native-code tags and the
//! list of variant files the resolver chooses from.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::device::DensityBucket;
use crate::core::error::{DeployError, DeployResult};
use crate::util::archive;

/// Native-code ABI keys as they appear in split names.
pub const KNOWN_ABIS: &[&str] = &[
    "armeabi",
    "armeabi_v7a",
    "arm64_v8a",
    "x86",
    "x86_64",
    "mips",
    "mips64",
];

/// Split-name spelling of an ABI (`arm64-v8a` becomes `arm64_v8a`).
pub fn normalize_abi(abi: &str) -> String {
    abi.trim().replace('-', "_")
}

/// On-disk package format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Apk,
    Xapk,
    Apkm,
    Apks,
    Aab,
}

impl PackageKind {
    /// Determine the format by extension, falling back to sniffing the zip content.
    pub fn detect(path: &Path) -> DeployResult<PackageKind> {
        if path.is_dir() {
            if path.join("manifest.json").is_file() {
                return Ok(PackageKind::Xapk);
            }
            return Err(DeployError::UnsupportedPackage {
                path: path.to_path_buf(),
            });
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("apk") => return Ok(PackageKind::Apk),
            Some("xapk") => return Ok(PackageKind::Xapk),
            Some("apkm") => return Ok(PackageKind::Apkm),
            Some("apks") => return Ok(PackageKind::Apks),
            Some("aab") => return Ok(PackageKind::Aab),
            _ => {}
        }

        let unsupported = || DeployError::UnsupportedPackage {
            path: path.to_path_buf(),
        };
        let names = archive::entry_names(path).map_err(|_| unsupported())?;
        Self::sniff(&names).ok_or_else(unsupported)
    }

    /// Classify a zip by its entry names.
    pub fn sniff(names: &[String]) -> Option<PackageKind> {
        let has = |wanted: &str| names.iter().any(|n| n == wanted);
        if has("manifest.json") {
            Some(PackageKind::Xapk)
        } else if has("info.json") {
            Some(PackageKind::Apkm)
        } else if has("toc.pb") {
            Some(PackageKind::Apks)
        } else if has("BundleConfig.pb") {
            Some(PackageKind::Aab)
        } else if has("AndroidManifest.xml") {
            Some(PackageKind::Apk)
        } else {
            None
        }
    }
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PackageKind::Apk => "apk",
            PackageKind::Xapk => "xapk",
            PackageKind::Apkm => "apkm",
            PackageKind::Apks => "apks",
            PackageKind::Aab => "aab",
        };
        f.write_str(s)
    }
}

/// Capability dimension a variant file is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VariantCategory {
    /// Always installed.
    Base,
    Abi,
    Density,
    /// Language split matched against the device locale.
    Locale,
    /// Language split that may be installed when nothing matches the device.
    LanguageFallback,
    /// Optional feature module, never selected automatically.
    FeatureExcluded,
}

impl fmt::Display for VariantCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VariantCategory::Base => "base",
            VariantCategory::Abi => "abi",
            VariantCategory::Density => "density",
            VariantCategory::Locale => "locale",
            VariantCategory::LanguageFallback => "language-fallback",
            VariantCategory::FeatureExcluded => "excluded",
        };
        f.write_str(s)
    }
}

/// One file of a split package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantEntry {
    pub category: VariantCategory,
    /// Category-specific key, e.g. `arm64_v8a`, `xxhdpi`, `en`.
    pub key: String,
    pub file: PathBuf,
}

impl VariantEntry {
    pub fn new(category: VariantCategory, key: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        VariantEntry {
            category,
            key: key.into(),
            file: file.into(),
        }
    }

    pub fn base(file: impl Into<PathBuf>) -> Self {
        VariantEntry::new(VariantCategory::Base, "base", file)
    }

    /// Whether this entry is a language split of either kind.
    pub fn is_language(&self) -> bool {
        matches!(
            self.category,
            VariantCategory::Locale | VariantCategory::LanguageFallback
        )
    }
}

/// Companion data pushed to external storage after install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Expansion {
    pub file: PathBuf,
    pub install_location: String,
    pub install_path: String,
}

/// Normalized view of a package's variant files and compatibility metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageDescriptor {
    pub package_name: String,
    pub version_code: u64,
    pub min_sdk: u32,
    /// Absence is non-fatal; the SDK-too-high check is skipped.
    pub target_sdk: Option<u32>,
    /// Native-code ABI tags declared by the package, split-name spelling.
    pub native_code: Vec<String>,
    /// `true` for multi-file bundles, `false` for a single monolithic apk.
    pub split: bool,
    pub entries: Vec<VariantEntry>,
    pub expansions: Vec<Expansion>,
}

impl PackageDescriptor {
    /// Descriptor for a single monolithic apk.
    pub fn monolithic(
        package_name: impl Into<String>,
        version_code: u64,
        min_sdk: u32,
        target_sdk: Option<u32>,
        native_code: Vec<String>,
        file: impl Into<PathBuf>,
    ) -> Self {
        PackageDescriptor {
            package_name: package_name.into(),
            version_code,
            min_sdk,
            target_sdk,
            native_code: native_code.iter().map(|abi| normalize_abi(abi)).collect(),
            split: false,
            entries: vec![VariantEntry::base(file)],
            expansions: Vec::new(),
        }
    }

    /// Entries of one category, in descriptor order.
    pub fn entries_of(&self, category: VariantCategory) -> impl Iterator<Item = &VariantEntry> {
        self.entries.iter().filter(move |e| e.category == category)
    }

    /// Whether any entry is restricted to an ABI.
    pub fn has_abi_entries(&self) -> bool {
        self.entries_of(VariantCategory::Abi).next().is_some()
    }

    /// ABI tags the package can satisfy, from split entries or native code.
    pub fn package_abis(&self) -> Vec<String> {
        if self.has_abi_entries() {
            self.entries_of(VariantCategory::Abi)
                .map(|e| e.key.clone())
                .collect()
        } else {
            self.native_code.clone()
        }
    }

    /// Check structural invariants before resolution.
    pub fn validate(&self, source: &Path) -> DeployResult<()> {
        let invalid = |reason: String| DeployError::InvalidDescriptor {
            path: source.to_path_buf(),
            reason,
        };
        if self.package_name.trim().is_empty() {
            return Err(invalid("package name is empty".into()));
        }
        if self.entries_of(VariantCategory::Base).next().is_none() {
            return Err(invalid("no unconditional (base) entry".into()));
        }
        if !self.split && self.entries.len() != 1 {
            return Err(invalid(format!(
                "a monolithic package has exactly one file, found {}",
                self.entries.len()
            )));
        }
        Ok(())
    }
}

/// Classifies split identifiers into variant categories.
#[derive(Debug, Clone)]
pub struct SplitClassifier {
    fallback_languages: Vec<String>,
    excluded_features: Vec<String>,
}

impl SplitClassifier {
    pub fn new(fallback_languages: Vec<String>, excluded_features: Vec<String>) -> Self {
        SplitClassifier {
            fallback_languages,
            excluded_features,
        }
    }

    /// Classify an xapk split id such as `base`, `config.arm64_v8a` or `config.fr`.
    pub fn classify(&self, id: &str) -> (VariantCategory, String) {
        let id = id.trim();
        if self.is_excluded(id) {
            return (VariantCategory::FeatureExcluded, id.to_string());
        }
        if id == "base" {
            return (VariantCategory::Base, "base".to_string());
        }
        match id.strip_prefix("config.") {
            Some(key) => self.classify_config(key, id),
            None => (VariantCategory::Base, id.to_string()),
        }
    }

    /// Classify an apkm entry such as `base.apk` or `split_config.xxhdpi.apk`.
    pub fn classify_file(&self, file_name: &str) -> (VariantCategory, String) {
        let stem = file_name.strip_suffix(".apk").unwrap_or(file_name);
        if stem == "base" {
            return (VariantCategory::Base, "base".to_string());
        }
        match stem.strip_prefix("split_config.") {
            Some(key) => {
                if self.is_excluded(key) {
                    return (VariantCategory::FeatureExcluded, key.to_string());
                }
                self.classify_config(key, stem)
            }
            None if self.is_excluded(stem) => (VariantCategory::FeatureExcluded, stem.to_string()),
            None => (VariantCategory::Base, stem.to_string()),
        }
    }

    fn is_excluded(&self, id: &str) -> bool {
        let key = id.strip_prefix("config.").unwrap_or(id);
        self.excluded_features.iter().any(|f| f == id || f == key)
    }

    fn classify_config(&self, key: &str, id: &str) -> (VariantCategory, String) {
        let abi = normalize_abi(key);
        if KNOWN_ABIS.contains(&abi.as_str()) {
            return (VariantCategory::Abi, abi);
        }
        if key.parse::<DensityBucket>().is_ok() {
            return (VariantCategory::Density, key.to_string());
        }
        if self.fallback_languages.iter().any(|l| l == key) {
            return (VariantCategory::LanguageFallback, key.to_string());
        }
        if looks_like_language(key) {
            return (VariantCategory::Locale, key.to_ascii_lowercase());
        }
        (VariantCategory::Base, id.to_string())
    }
}

/// Two or three ASCII letters, optionally followed by a region subtag.
fn looks_like_language(tag: &str) -> bool {
    let mut parts = tag.split(['-', '_']);
    let lang = parts.next().unwrap_or_default();
    let lang_ok = (2..=3).contains(&lang.len()) && lang.chars().all(|c| c.is_ascii_alphabetic());
    let rest_ok = parts.all(|p| {
        (2..=3).contains(&p.len())
            && p.chars().all(|c| c.is_ascii_alphanumeric())
    });
    lang_ok && rest_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::default_classifier;

    #[test]
    fn test_classify_xapk_ids() {
        let classifier = default_classifier();
        assert_eq!(classifier.classify("base"), (VariantCategory::Base, "base".into()));
        assert_eq!(
            classifier.classify("config.arm64_v8a"),
            (VariantCategory::Abi, "arm64_v8a".into())
        );
        assert_eq!(
            classifier.classify("config.xxhdpi"),
            (VariantCategory::Density, "xxhdpi".into())
        );
        assert_eq!(
            classifier.classify("config.fr"),
            (VariantCategory::LanguageFallback, "fr".into())
        );
        assert_eq!(
            classifier.classify("config.uk"),
            (VariantCategory::Locale, "uk".into())
        );
        assert_eq!(
            classifier.classify("feedv2"),
            (VariantCategory::FeatureExcluded, "feedv2".into())
        );
        assert_eq!(
            classifier.classify("config.feedv2"),
            (VariantCategory::FeatureExcluded, "config.feedv2".into())
        );
        assert_eq!(
            classifier.classify("com.example.dynamic"),
            (VariantCategory::Base, "com.example.dynamic".into())
        );
    }

    #[test]
    fn test_classify_apkm_files() {
        let classifier = default_classifier();
        assert_eq!(
            classifier.classify_file("base.apk"),
            (VariantCategory::Base, "base".into())
        );
        assert_eq!(
            classifier.classify_file("split_config.armeabi_v7a.apk"),
            (VariantCategory::Abi, "armeabi_v7a".into())
        );
        assert_eq!(
            classifier.classify_file("split_config.tvdpi.apk"),
            (VariantCategory::Density, "tvdpi".into())
        );
        assert_eq!(
            classifier.classify_file("split_config.en.apk"),
            (VariantCategory::LanguageFallback, "en".into())
        );
        assert_eq!(
            classifier.classify_file("split_chime.apk"),
            (VariantCategory::Base, "split_chime".into())
        );
    }

    #[test]
    fn test_sniff_kinds() {
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(
            PackageKind::sniff(&names(&["icon.png", "manifest.json"])),
            Some(PackageKind::Xapk)
        );
        assert_eq!(PackageKind::sniff(&names(&["info.json"])), Some(PackageKind::Apkm));
        assert_eq!(PackageKind::sniff(&names(&["toc.pb"])), Some(PackageKind::Apks));
        assert_eq!(
            PackageKind::sniff(&names(&["BundleConfig.pb", "base/"])),
            Some(PackageKind::Aab)
        );
        assert_eq!(
            PackageKind::sniff(&names(&["AndroidManifest.xml", "classes.dex"])),
            Some(PackageKind::Apk)
        );
        assert_eq!(PackageKind::sniff(&names(&["README"])), None);
    }

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(PackageKind::detect(Path::new("app.APK")).unwrap(), PackageKind::Apk);
        assert_eq!(PackageKind::detect(Path::new("app.aab")).unwrap(), PackageKind::Aab);
        assert!(matches!(
            PackageKind::detect(Path::new("/nonexistent/readme.txt")),
            Err(DeployError::UnsupportedPackage { .. })
        ));
    }

    #[test]
    fn test_detect_unpacked_xapk_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(PackageKind::detect(tmp.path()).is_err());
        std::fs::write(tmp.path().join("manifest.json"), "{}").unwrap();
        assert_eq!(PackageKind::detect(tmp.path()).unwrap(), PackageKind::Xapk);
    }

    #[test]
    fn test_validate_requires_base() {
        let mut descriptor = PackageDescriptor::monolithic("com.example", 1, 21, None, vec![], "a.apk");
        assert!(descriptor.validate(Path::new("a.apk")).is_ok());

        descriptor.split = true;
        descriptor.entries = vec![VariantEntry::new(VariantCategory::Abi, "x86", "x86.apk")];
        assert!(matches!(
            descriptor.validate(Path::new("a.xapk")),
            Err(DeployError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn test_monolithic_normalizes_native_code() {
        let descriptor = PackageDescriptor::monolithic(
            "com.example",
            3,
            21,
            Some(33),
            vec!["arm64-v8a".into(), "x86_64".into()],
            "a.apk",
        );
        assert_eq!(descriptor.package_abis(), vec!["arm64_v8a", "x86_64"]);
        assert!(!descriptor.has_abi_entries());
    }

    #[test]
    fn test_looks_like_language() {
        assert!(looks_like_language("en"));
        assert!(looks_like_language("fil"));
        assert!(looks_like_language("pt-BR"));
        assert!(!looks_like_language("english"));
        assert!(!looks_like_language("x1"));
    }
}
