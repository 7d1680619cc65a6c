//! Device capability profile.
//!
//! A [`DeviceProfile`] answers the install-relevant questions about one
//! connected device (ABIs, screen density, language, SDK level). Each
//! attribute is queried at most once; once a value has been read it is
//! cached for the rest of the session.

use std::cell::OnceCell;
use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adb::parse::{parse_dumpsys_density, parse_wm_density};
use crate::adb::Device;
use crate::core::error::{DeployError, DeployResult};

/// Property names for the primary ABI.
pub const ABI_PROPS: &[&str] = &["ro.product.cpu.abi"];

/// Property names for the ABI preference list.
pub const ABI_LIST_PROPS: &[&str] = &["ro.product.cpu.abilist"];

/// Secondary ABI on devices that predate `ro.product.cpu.abilist`.
pub const LEGACY_ABI2_PROP: &str = "ro.product.cpu.abi2";

/// Property names for the device locale, most specific first.
pub const LOCALE_PROPS: &[&str] = &[
    "persist.sys.locale",
    "ro.product.locale",
    "ro.product.locale.language",
];

/// Historical aliases for the platform SDK level.
pub const SDK_PROPS: &[&str] = &[
    "ro.build.version.sdk",
    "ro.product.build.version.sdk",
    "ro.system.build.version.sdk",
    "ro.system_ext.build.version.sdk",
];

/// Property holding the LCD density on older builds.
pub const LCD_DENSITY_PROP: &str = "ro.sf.lcd_density";

/// Named screen density class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DensityBucket {
    Ldpi,
    Mdpi,
    Tvdpi,
    Hdpi,
    Xhdpi,
    Xxhdpi,
    Xxxhdpi,
    Nodpi,
}

impl DensityBucket {
    /// Every bucket, in declaration order.
    pub const ALL: [DensityBucket; 8] = [
        DensityBucket::Ldpi,
        DensityBucket::Mdpi,
        DensityBucket::Tvdpi,
        DensityBucket::Hdpi,
        DensityBucket::Xhdpi,
        DensityBucket::Xxhdpi,
        DensityBucket::Xxxhdpi,
        DensityBucket::Nodpi,
    ];

    /// The split-name spelling of this bucket.
    pub fn as_str(&self) -> &'static str {
        match self {
            DensityBucket::Ldpi => "ldpi",
            DensityBucket::Mdpi => "mdpi",
            DensityBucket::Tvdpi => "tvdpi",
            DensityBucket::Hdpi => "hdpi",
            DensityBucket::Xhdpi => "xhdpi",
            DensityBucket::Xxhdpi => "xxhdpi",
            DensityBucket::Xxxhdpi => "xxxhdpi",
            DensityBucket::Nodpi => "nodpi",
        }
    }
}

impl fmt::Display for DensityBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DensityBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DensityBucket::ALL
            .into_iter()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| format!("unknown density bucket '{}'", s))
    }
}

/// One threshold band: every dpi up to and including `max_dpi` maps to `bucket`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DensityBand {
    pub max_dpi: u32,
    pub bucket: DensityBucket,
}

/// Tunable dpi-to-bucket table and the fallback order used by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityPolicy {
    /// Threshold bands in increasing `max_dpi` order.
    pub bands: Vec<DensityBand>,

    /// Bucket for any dpi above the last band.
    pub above: DensityBucket,

    /// Order in which density splits are tried when no exact match exists.
    pub fallback_order: Vec<DensityBucket>,
}

impl Default for DensityPolicy {
    fn default() -> Self {
        use DensityBucket::*;

        let band = |max_dpi, bucket| DensityBand { max_dpi, bucket };
        DensityPolicy {
            bands: vec![
                band(120, Ldpi),
                band(160, Mdpi),
                band(239, Tvdpi),
                band(240, Hdpi),
                band(320, Xhdpi),
                band(480, Xxhdpi),
                band(640, Xxxhdpi),
            ],
            above: Xxxhdpi,
            fallback_order: vec![Xxxhdpi, Xxhdpi, Xhdpi, Hdpi, Tvdpi, Mdpi, Ldpi, Nodpi],
        }
    }
}

impl DensityPolicy {
    /// Map a raw dpi value to its bucket.
    pub fn bucket_for(&self, dpi: u32) -> DensityBucket {
        self.bands
            .iter()
            .find(|band| dpi <= band.max_dpi)
            .map(|band| band.bucket)
            .unwrap_or(self.above)
    }

    /// Check the table is usable: non-empty, strictly increasing, no duplicate fallbacks.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bands.is_empty() {
            bail!("density policy has no bands");
        }
        for pair in self.bands.windows(2) {
            if pair[1].max_dpi <= pair[0].max_dpi {
                bail!(
                    "density bands must be strictly increasing ({} follows {})",
                    pair[1].max_dpi,
                    pair[0].max_dpi
                );
            }
        }
        for (i, bucket) in self.fallback_order.iter().enumerate() {
            if self.fallback_order[..i].contains(bucket) {
                bail!("density fallback order lists `{}` twice", bucket);
            }
        }
        Ok(())
    }
}

/// Resolved, immutable view of a device's capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSnapshot {
    pub serial: String,
    pub abi: String,
    pub abi_list: Vec<String>,
    pub density_dpi: u32,
    pub density_bucket: DensityBucket,
    /// Language subtag with the region stripped (`en` for `en-US`).
    pub locale: String,
    pub sdk_version: u32,
}

impl fmt::Display for DeviceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.serial)?;
        writeln!(f, "  abi:      {}", self.abi)?;
        writeln!(f, "  abi list: {}", self.abi_list.join(", "))?;
        writeln!(f, "  density:  {} ({} dpi)", self.density_bucket, self.density_dpi)?;
        writeln!(f, "  locale:   {}", self.locale)?;
        write!(f, "  sdk:      {}", self.sdk_version)
    }
}

/// Lazily-populated capability profile for one device.
pub struct DeviceProfile<'a> {
    device: &'a Device<'a>,
    policy: DensityPolicy,
    abi: OnceCell<String>,
    abi_list: OnceCell<Vec<String>>,
    density_dpi: OnceCell<u32>,
    locale: OnceCell<String>,
    sdk_version: OnceCell<u32>,
}

impl<'a> DeviceProfile<'a> {
    /// Create a profile; nothing is queried until an accessor is called.
    pub fn new(device: &'a Device<'a>, policy: DensityPolicy) -> Self {
        DeviceProfile {
            device,
            policy,
            abi: OnceCell::new(),
            abi_list: OnceCell::new(),
            density_dpi: OnceCell::new(),
            locale: OnceCell::new(),
            sdk_version: OnceCell::new(),
        }
    }

    /// Connection handle of the profiled device.
    pub fn serial(&self) -> &str {
        self.device.serial()
    }

    /// Primary ABI, e.g. `arm64-v8a`.
    pub fn abi(&self) -> DeployResult<&str> {
        if let Some(abi) = self.abi.get() {
            return Ok(abi);
        }
        let value = self.first_prop("abi", ABI_PROPS)?;
        Ok(self.abi.get_or_init(|| value))
    }

    /// ABI preference list, most capable first.
    pub fn abi_list(&self) -> DeployResult<&[String]> {
        if let Some(list) = self.abi_list.get() {
            return Ok(list);
        }
        let list = match self.first_prop("abi list", ABI_LIST_PROPS) {
            Ok(raw) => split_abi_list(&raw),
            Err(_) => {
                debug!(serial = self.serial(), "no abilist property, using legacy abi props");
                let mut list = vec![self.abi()?.to_string()];
                let abi2 = self.getprop(LEGACY_ABI2_PROP, "abi list")?;
                if !abi2.is_empty() && !list.contains(&abi2) {
                    list.push(abi2);
                }
                list
            }
        };
        Ok(self.abi_list.get_or_init(|| list))
    }

    /// Raw display density in dots per inch.
    pub fn density_dpi(&self) -> DeployResult<u32> {
        if let Some(dpi) = self.density_dpi.get() {
            return Ok(*dpi);
        }
        let dpi = self.query_density()?;
        Ok(*self.density_dpi.get_or_init(|| dpi))
    }

    /// Density bucket derived from the raw dpi through the policy table.
    pub fn density_bucket(&self) -> DeployResult<DensityBucket> {
        Ok(self.policy.bucket_for(self.density_dpi()?))
    }

    /// Language subtag of the device locale, region stripped.
    pub fn locale(&self) -> DeployResult<&str> {
        if let Some(locale) = self.locale.get() {
            return Ok(locale);
        }
        let raw = self.first_prop("locale", LOCALE_PROPS)?;
        Ok(self.locale.get_or_init(|| language_of(&raw)))
    }

    /// Platform SDK level.
    pub fn sdk_version(&self) -> DeployResult<u32> {
        if let Some(sdk) = self.sdk_version.get() {
            return Ok(*sdk);
        }
        let raw = self.first_prop("sdk version", SDK_PROPS)?;
        let sdk = raw.parse::<u32>().map_err(|_| DeployError::DeviceUnreachable {
            serial: self.serial().to_string(),
            field: "sdk version",
            reason: format!("`{}` is not an SDK level", raw),
        })?;
        Ok(*self.sdk_version.get_or_init(|| sdk))
    }

    /// Read every attribute and freeze them into a snapshot.
    pub fn snapshot(&self) -> DeployResult<DeviceSnapshot> {
        Ok(DeviceSnapshot {
            serial: self.serial().to_string(),
            abi: self.abi()?.to_string(),
            abi_list: self.abi_list()?.to_vec(),
            density_dpi: self.density_dpi()?,
            density_bucket: self.density_bucket()?,
            locale: self.locale()?.to_string(),
            sdk_version: self.sdk_version()?,
        })
    }

    fn getprop(&self, prop: &str, field: &'static str) -> DeployResult<String> {
        self.device
            .getprop(prop)
            .map_err(|e| DeployError::DeviceUnreachable {
                serial: self.serial().to_string(),
                field,
                reason: format!("{:#}", e),
            })
    }

    fn first_prop(&self, field: &'static str, props: &[&str]) -> DeployResult<String> {
        for prop in props {
            let value = self.getprop(prop, field)?;
            if !value.is_empty() {
                return Ok(value);
            }
            debug!(serial = self.serial(), prop, "property empty, trying next alias");
        }
        Err(DeployError::DeviceUnreachable {
            serial: self.serial().to_string(),
            field,
            reason: format!("none of {} returned a value", props.join(", ")),
        })
    }

    fn query_density(&self) -> DeployResult<u32> {
        let unreachable = |reason: String| DeployError::DeviceUnreachable {
            serial: self.serial().to_string(),
            field: "density",
            reason,
        };

        let wm = self
            .device
            .shell(&["wm", "density"])
            .map_err(|e| unreachable(format!("{:#}", e)))?;
        if let Some(dpi) = wm.success().then(|| parse_wm_density(&wm.stdout)).flatten() {
            return Ok(dpi);
        }

        let dumpsys = self
            .device
            .shell(&["dumpsys", "window", "displays"])
            .map_err(|e| unreachable(format!("{:#}", e)))?;
        if let Some(dpi) = parse_dumpsys_density(&dumpsys.stdout) {
            return Ok(dpi);
        }

        let prop = self.getprop(LCD_DENSITY_PROP, "density")?;
        prop.parse::<u32>().map_err(|_| {
            unreachable("neither `wm density`, `dumpsys window` nor ro.sf.lcd_density reported a density".into())
        })
    }
}

/// Split a comma-separated `abilist` value.
pub fn split_abi_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Lowercased language subtag of a locale tag (`en-US`, `pt_BR`, `zh`).
pub fn language_of(tag: &str) -> String {
    tag.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{arm64_phone, CommandExpectation, CommandPattern, MockChannel, MockProcessOutput};

    #[test]
    fn test_density_boundaries() {
        let policy = DensityPolicy::default();
        let cases = [
            (1, DensityBucket::Ldpi),
            (120, DensityBucket::Ldpi),
            (121, DensityBucket::Mdpi),
            (160, DensityBucket::Mdpi),
            (161, DensityBucket::Tvdpi),
            (213, DensityBucket::Tvdpi),
            (239, DensityBucket::Tvdpi),
            (240, DensityBucket::Hdpi),
            (241, DensityBucket::Xhdpi),
            (320, DensityBucket::Xhdpi),
            (321, DensityBucket::Xxhdpi),
            (480, DensityBucket::Xxhdpi),
            (481, DensityBucket::Xxxhdpi),
            (640, DensityBucket::Xxxhdpi),
            (641, DensityBucket::Xxxhdpi),
        ];
        for (dpi, expected) in cases {
            assert_eq!(policy.bucket_for(dpi), expected, "dpi {}", dpi);
        }
    }

    #[test]
    fn test_custom_density_table() {
        let policy = DensityPolicy {
            bands: vec![
                DensityBand {
                    max_dpi: 200,
                    bucket: DensityBucket::Mdpi,
                },
                DensityBand {
                    max_dpi: 400,
                    bucket: DensityBucket::Xhdpi,
                },
            ],
            above: DensityBucket::Nodpi,
            fallback_order: vec![DensityBucket::Xhdpi],
        };
        assert_eq!(policy.bucket_for(200), DensityBucket::Mdpi);
        assert_eq!(policy.bucket_for(201), DensityBucket::Xhdpi);
        assert_eq!(policy.bucket_for(401), DensityBucket::Nodpi);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_density_policy_validation() {
        let mut policy = DensityPolicy::default();
        assert!(policy.validate().is_ok());

        policy.bands.swap(0, 1);
        assert!(policy.validate().is_err());

        let mut policy = DensityPolicy::default();
        policy.fallback_order.push(DensityBucket::Hdpi);
        assert!(policy.validate().is_err());

        let policy = DensityPolicy {
            bands: Vec::new(),
            ..DensityPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_bucket_parse() {
        assert_eq!("xxhdpi".parse::<DensityBucket>().unwrap(), DensityBucket::Xxhdpi);
        assert!("retina".parse::<DensityBucket>().is_err());
    }

    #[test]
    fn test_language_of() {
        assert_eq!(language_of("en-US"), "en");
        assert_eq!(language_of("pt_BR"), "pt");
        assert_eq!(language_of("ZH"), "zh");
        assert_eq!(language_of(" fr \n"), "fr");
    }

    #[test]
    fn test_profile_reads_each_field_once() {
        let mut channel = MockChannel::new();
        channel.expect_pattern(
            CommandExpectation::new(
                CommandPattern::Exact("-s emu shell getprop ro.product.cpu.abi".into()),
                MockProcessOutput::success("arm64-v8a\n"),
            )
            .times(1),
        );
        channel.expect_pattern(
            CommandExpectation::new(
                CommandPattern::Exact("-s emu shell wm density".into()),
                MockProcessOutput::success("Physical density: 480\n"),
            )
            .times(1),
        );

        let device = Device::new(&channel, "emu");
        let profile = DeviceProfile::new(&device, DensityPolicy::default());

        assert_eq!(profile.abi().unwrap(), "arm64-v8a");
        assert_eq!(profile.abi().unwrap(), "arm64-v8a");
        assert_eq!(profile.density_bucket().unwrap(), DensityBucket::Xxhdpi);
        assert_eq!(profile.density_dpi().unwrap(), 480);

        channel.verify().unwrap();
        assert_eq!(channel.calls().len(), 2);
    }

    #[test]
    fn test_sdk_walks_aliases() {
        let mut channel = MockChannel::new();
        channel.expect(
            "-s emu shell getprop ro.build.version.sdk",
            MockProcessOutput::success("\n"),
        );
        channel.expect(
            "-s emu shell getprop ro.product.build.version.sdk",
            MockProcessOutput::success(""),
        );
        channel.expect(
            "-s emu shell getprop ro.system.build.version.sdk",
            MockProcessOutput::success("30\n"),
        );

        let device = Device::new(&channel, "emu");
        let profile = DeviceProfile::new(&device, DensityPolicy::default());
        assert_eq!(profile.sdk_version().unwrap(), 30);
        assert_eq!(profile.sdk_version().unwrap(), 30);
        assert_eq!(channel.calls().len(), 3);
    }

    #[test]
    fn test_sdk_unreachable_after_all_aliases() {
        let mut channel = MockChannel::new();
        channel.expect_prefix("-s emu shell getprop", MockProcessOutput::success(""));

        let device = Device::new(&channel, "emu");
        let profile = DeviceProfile::new(&device, DensityPolicy::default());
        match profile.sdk_version() {
            Err(DeployError::DeviceUnreachable { field, .. }) => assert_eq!(field, "sdk version"),
            other => panic!("expected DeviceUnreachable, got {:?}", other),
        }
        assert_eq!(channel.calls().len(), SDK_PROPS.len());
    }

    #[test]
    fn test_snapshot_from_fixture() {
        let channel = MockChannel::new().with_device(&arm64_phone("emu"));
        let device = Device::new(&channel, "emu");
        let snapshot = DeviceProfile::new(&device, DensityPolicy::default())
            .snapshot()
            .unwrap();

        assert_eq!(snapshot.abi, "arm64-v8a");
        assert_eq!(snapshot.abi_list, vec!["arm64-v8a", "armeabi-v7a", "armeabi"]);
        assert_eq!(snapshot.density_bucket, DensityBucket::Xxhdpi);
        assert_eq!(snapshot.locale, "en");
        assert_eq!(snapshot.sdk_version, 33);
    }

    #[test]
    fn test_density_falls_back_to_dumpsys() {
        let mut channel = MockChannel::new();
        channel.expect("-s emu shell wm density", MockProcessOutput::failure(1, "wm: not found"));
        channel.expect(
            "-s emu shell dumpsys window displays",
            MockProcessOutput::success("  init=1080x1920 420dpi cur=1080x1920\n"),
        );

        let device = Device::new(&channel, "emu");
        let profile = DeviceProfile::new(&device, DensityPolicy::default());
        assert_eq!(profile.density_dpi().unwrap(), 420);
        assert_eq!(profile.density_bucket().unwrap(), DensityBucket::Xxhdpi);
    }
}
