//! Test fixtures for devices, descriptors and package files.

use std::io::Write;
use std::path::Path;

use crate::core::device::{DensityBucket, DeviceSnapshot};
use crate::core::package::{PackageDescriptor, SplitClassifier, VariantCategory, VariantEntry};
use crate::util::config::ResolverConfig;

use super::{CommandExpectation, CommandPattern, MockProcessOutput};

/// Property set of a simulated device.
#[derive(Debug, Clone)]
pub struct DeviceFixture {
    pub serial: String,
    pub abi: String,
    pub abi_list: String,
    pub density: u32,
    pub locale: String,
    pub sdk: u32,
}

impl DeviceFixture {
    /// Expectations answering every profile query for this device.
    pub fn expectations(&self) -> Vec<CommandExpectation> {
        let prop = |name: &str, value: &str| {
            CommandExpectation::new(
                CommandPattern::Exact(format!("-s {} shell getprop {}", self.serial, name)),
                MockProcessOutput::success(format!("{}\n", value)),
            )
        };
        vec![
            prop("ro.product.cpu.abi", &self.abi),
            prop("ro.product.cpu.abilist", &self.abi_list),
            prop("persist.sys.locale", &self.locale),
            prop("ro.build.version.sdk", &self.sdk.to_string()),
            CommandExpectation::new(
                CommandPattern::Exact(format!("-s {} shell wm density", self.serial)),
                MockProcessOutput::success(format!("Physical density: {}\n", self.density)),
            ),
            CommandExpectation::new(
                CommandPattern::StartsWith(format!("-s {} shell getprop", self.serial)),
                MockProcessOutput::success("\n"),
            ),
        ]
    }

    pub fn snapshot(&self, bucket: DensityBucket) -> DeviceSnapshot {
        DeviceSnapshot {
            serial: self.serial.clone(),
            abi: self.abi.clone(),
            abi_list: self.abi_list.split(',').map(String::from).collect(),
            density_dpi: self.density,
            density_bucket: bucket,
            locale: crate::core::device::language_of(&self.locale),
            sdk_version: self.sdk,
        }
    }
}

/// 64-bit ARM phone: arm64-v8a, 480 dpi, en-US, SDK 33.
pub fn arm64_phone(serial: &str) -> DeviceFixture {
    DeviceFixture {
        serial: serial.to_string(),
        abi: "arm64-v8a".into(),
        abi_list: "arm64-v8a,armeabi-v7a,armeabi".into(),
        density: 480,
        locale: "en-US".into(),
        sdk: 33,
    }
}

/// 32-bit ARM tablet: armeabi-v7a only, 320 dpi, fr-FR, SDK 28.
pub fn armv7_tablet(serial: &str) -> DeviceFixture {
    DeviceFixture {
        serial: serial.to_string(),
        abi: "armeabi-v7a".into(),
        abi_list: "armeabi-v7a".into(),
        density: 320,
        locale: "fr-FR".into(),
        sdk: 28,
    }
}

/// Snapshot of [`arm64_phone`].
pub fn arm64_snapshot() -> DeviceSnapshot {
    arm64_phone("emu").snapshot(DensityBucket::Xxhdpi)
}

/// Split descriptor with two ABIs, two densities and two locales.
pub fn split_descriptor() -> PackageDescriptor {
    PackageDescriptor {
        package_name: "com.example.app".into(),
        version_code: 100,
        min_sdk: 21,
        target_sdk: Some(33),
        native_code: Vec::new(),
        split: true,
        entries: vec![
            VariantEntry::base("base.apk"),
            VariantEntry::new(VariantCategory::Abi, "arm64_v8a", "config.arm64_v8a.apk"),
            VariantEntry::new(VariantCategory::Abi, "armeabi_v7a", "config.armeabi_v7a.apk"),
            VariantEntry::new(VariantCategory::Density, "xxhdpi", "config.xxhdpi.apk"),
            VariantEntry::new(VariantCategory::Density, "xhdpi", "config.xhdpi.apk"),
            VariantEntry::new(VariantCategory::Locale, "en", "config.en.apk"),
            VariantEntry::new(VariantCategory::Locale, "fr", "config.fr.apk"),
        ],
        expansions: Vec::new(),
    }
}

/// Classifier with the default language and feature lists.
pub fn default_classifier() -> SplitClassifier {
    let config = ResolverConfig::default();
    SplitClassifier::new(config.fallback_languages, config.excluded_features)
}

/// Write a zip archive with the given entries.
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).expect("failed to create zip");
    let mut writer = zip::ZipWriter::new(file);
    let options: zip::write::FileOptions<'_, ()> = zip::write::FileOptions::default();
    for (name, data) in entries {
        writer.start_file(*name, options).expect("failed to start zip entry");
        writer.write_all(data).expect("failed to write zip entry");
    }
    writer.finish().expect("failed to finish zip");
}

/// xapk `manifest.json` for the entries of [`split_descriptor`].
pub fn xapk_manifest_json() -> &'static str {
    r#"{
  "package_name": "com.example.app",
  "version_code": "100",
  "min_sdk_version": "21",
  "target_sdk_version": 33,
  "split_apks": [
    {"file": "base.apk", "id": "base"},
    {"file": "config.arm64_v8a.apk", "id": "config.arm64_v8a"},
    {"file": "config.armeabi_v7a.apk", "id": "config.armeabi_v7a"},
    {"file": "config.xxhdpi.apk", "id": "config.xxhdpi"},
    {"file": "config.xhdpi.apk", "id": "config.xhdpi"},
    {"file": "config.en.apk", "id": "config.en"},
    {"file": "config.fr.apk", "id": "config.fr"},
    {"file": "feedv2.apk", "id": "feedv2"}
  ]
}"#
}

const ANDROID_NS: &str = "http://schemas.android.com/apk/res/android";
const NO_INDEX: u32 = 0xffff_ffff;

/// Compiled `AndroidManifest.xml` with a `<manifest>` and a `<uses-sdk>` element.
pub fn binary_manifest(
    package: &str,
    version_code: u32,
    min_sdk: u32,
    target_sdk: Option<u32>,
    utf8: bool,
) -> Vec<u8> {
    // Indices 0..3 are the attribute names covered by the resource map.
    let strings = [
        "versionCode",
        "minSdkVersion",
        "targetSdkVersion",
        "package",
        "manifest",
        "uses-sdk",
        package,
        "android",
        ANDROID_NS,
    ];
    let resource_map = [0x0101_021b_u32, 0x0101_020c, 0x0101_0270];

    let mut body = string_pool(&strings, utf8);

    push_u16(&mut body, 0x0180);
    push_u16(&mut body, 8);
    push_u32(&mut body, 8 + 4 * resource_map.len() as u32);
    for id in resource_map {
        push_u32(&mut body, id);
    }

    // (namespace, name, string value, int value)
    let manifest_attrs = [
        (NO_INDEX, 3, Some(6), 0),
        (8, 0, None, version_code),
    ];
    body.extend(start_element(4, &manifest_attrs));

    let mut sdk_attrs = vec![(8, 1, None, min_sdk)];
    if let Some(target) = target_sdk {
        sdk_attrs.push((8, 2, None, target));
    }
    body.extend(start_element(5, &sdk_attrs));

    let mut doc = Vec::new();
    push_u16(&mut doc, 0x0003);
    push_u16(&mut doc, 8);
    push_u32(&mut doc, 8 + body.len() as u32);
    doc.extend(body);
    doc
}

fn string_pool(strings: &[&str], utf8: bool) -> Vec<u8> {
    let mut data = Vec::new();
    let mut offsets = Vec::new();
    for s in strings {
        offsets.push(data.len() as u32);
        if utf8 {
            data.push(s.chars().count() as u8);
            data.push(s.len() as u8);
            data.extend_from_slice(s.as_bytes());
            data.push(0);
        } else {
            let units: Vec<u16> = s.encode_utf16().collect();
            push_u16(&mut data, units.len() as u16);
            for unit in units {
                push_u16(&mut data, unit);
            }
            push_u16(&mut data, 0);
        }
    }
    while data.len() % 4 != 0 {
        data.push(0);
    }

    let header = 28u32;
    let strings_start = header + 4 * strings.len() as u32;
    let mut chunk = Vec::new();
    push_u16(&mut chunk, 0x0001);
    push_u16(&mut chunk, header as u16);
    push_u32(&mut chunk, strings_start + data.len() as u32);
    push_u32(&mut chunk, strings.len() as u32);
    push_u32(&mut chunk, 0);
    push_u32(&mut chunk, if utf8 { 0x0100 } else { 0 });
    push_u32(&mut chunk, strings_start);
    push_u32(&mut chunk, 0);
    for offset in offsets {
        push_u32(&mut chunk, offset);
    }
    chunk.extend(data);
    chunk
}

fn start_element(name: u32, attrs: &[(u32, u32, Option<u32>, u32)]) -> Vec<u8> {
    let mut chunk = Vec::new();
    push_u16(&mut chunk, 0x0102);
    push_u16(&mut chunk, 16);
    push_u32(&mut chunk, 16 + 20 + 20 * attrs.len() as u32);
    push_u32(&mut chunk, 1);
    push_u32(&mut chunk, NO_INDEX);

    push_u32(&mut chunk, NO_INDEX);
    push_u32(&mut chunk, name);
    push_u16(&mut chunk, 20);
    push_u16(&mut chunk, 20);
    push_u16(&mut chunk, attrs.len() as u16);
    push_u16(&mut chunk, 0);
    push_u16(&mut chunk, 0);
    push_u16(&mut chunk, 0);

    for (ns, attr_name, string_value, int_value) in attrs {
        push_u32(&mut chunk, *ns);
        push_u32(&mut chunk, *attr_name);
        push_u32(&mut chunk, string_value.unwrap_or(NO_INDEX));
        push_u16(&mut chunk, 8);
        chunk.push(0);
        match string_value {
            Some(index) => {
                chunk.push(0x03);
                push_u32(&mut chunk, *index);
            }
            None => {
                chunk.push(0x10);
                push_u32(&mut chunk, *int_value);
            }
        }
    }
    chunk
}

fn push_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}
