//! Parsers for adb, pm, wm and dumpsys output.

use std::sync::LazyLock;

use regex::Regex;

static DPI_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{2,4})dpi\b").expect("static regex"));
static VERSION_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bversionCode=(\d+)").expect("static regex"));
static PRIMARY_ABI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bprimaryCpuAbi=(\S+)").expect("static regex"));
static SESSION_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+)\]").expect("static regex"));

/// Connection state reported by `adb devices`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceState {
    Device,
    Offline,
    Unauthorized,
    Other(String),
}

impl DeviceState {
    fn parse(s: &str) -> DeviceState {
        match s {
            "device" => DeviceState::Device,
            "offline" => DeviceState::Offline,
            "unauthorized" => DeviceState::Unauthorized,
            other => DeviceState::Other(other.to_string()),
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, DeviceState::Device)
    }
}

/// One line of `adb devices`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub serial: String,
    pub state: DeviceState,
}

/// Parse `adb devices` output.
pub fn parse_devices(output: &str) -> Vec<DeviceEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next()?;
            Some(DeviceEntry {
                serial: serial.to_string(),
                state: DeviceState::parse(state),
            })
        })
        .collect()
}

/// Parse `wm density`, preferring an override over the physical value.
pub fn parse_wm_density(output: &str) -> Option<u32> {
    let value_of = |prefix: &str| {
        output
            .lines()
            .find_map(|line| line.trim().strip_prefix(prefix))
            .and_then(|v| v.trim().parse::<u32>().ok())
    };
    value_of("Override density:").or_else(|| value_of("Physical density:"))
}

/// First `NNNdpi` token in `dumpsys window displays`.
pub fn parse_dumpsys_density(output: &str) -> Option<u32> {
    DPI_TOKEN
        .captures(output)
        .and_then(|c| c[1].parse::<u32>().ok())
}

/// Paths from `pm path <pkg>` (`package:/data/app/.../base.apk` lines).
pub fn parse_pm_path(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Version and ABI of an installed package, from `dumpsys package <pkg>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub version_code: u64,
    /// `None` for packages without native code (`primaryCpuAbi=null`).
    pub primary_abi: Option<String>,
}

/// Parse `dumpsys package <pkg>`; `None` when the package is not installed.
pub fn parse_dumpsys_package(output: &str, package: &str) -> Option<InstalledPackage> {
    let header = format!("Package [{}]", package);
    let section = &output[output.find(&header)?..];

    let version_code = VERSION_CODE
        .captures(section)
        .and_then(|c| c[1].parse::<u64>().ok())?;
    let primary_abi = PRIMARY_ABI
        .captures(section)
        .map(|c| c[1].to_string())
        .filter(|abi| abi != "null");

    Some(InstalledPackage {
        version_code,
        primary_abi,
    })
}

/// Session id from `pm install-create` (`Success: created install session [1234]`).
pub fn parse_session_id(output: &str) -> Option<u32> {
    if !output.contains("Success") {
        return None;
    }
    SESSION_ID
        .captures(output)
        .and_then(|c| c[1].parse::<u32>().ok())
}

/// Whether shell or sync output reports a missing remote path.
pub fn is_missing_path(output: &str) -> bool {
    output.contains("No such file or directory") || output.contains("does not exist")
}
