//! CLI integration tests for apkdeploy.
//!
//! Device-facing tests drive the binary against a fake `adb` shell script
//! that answers like a single arm64 phone and logs every invocation.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get the apkdeploy binary command, isolated from the user's configuration.
fn apkdeploy(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("apkdeploy").unwrap();
    cmd.current_dir(home)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("XDG_DATA_HOME", home.join(".local/share"))
        .env_remove("APKDEPLOY_ADB")
        .env_remove("RUST_LOG");
    cmd
}

/// Create a temporary directory for test projects.
fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

/// Unpacked xapk with two ABIs, two densities and two languages.
fn write_xapk_dir(root: &Path) -> PathBuf {
    let dir = root.join("app");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("manifest.json"),
        r#"{
  "package_name": "com.example.app",
  "version_code": "100",
  "min_sdk_version": "21",
  "target_sdk_version": "33",
  "split_apks": [
    {"file": "base.apk", "id": "base"},
    {"file": "config.arm64_v8a.apk", "id": "config.arm64_v8a"},
    {"file": "config.armeabi_v7a.apk", "id": "config.armeabi_v7a"},
    {"file": "config.xxhdpi.apk", "id": "config.xxhdpi"},
    {"file": "config.xhdpi.apk", "id": "config.xhdpi"},
    {"file": "config.en.apk", "id": "config.en"},
    {"file": "config.fr.apk", "id": "config.fr"}
  ]
}"#,
    )
    .unwrap();
    for name in [
        "base.apk",
        "config.arm64_v8a.apk",
        "config.armeabi_v7a.apk",
        "config.xxhdpi.apk",
        "config.xhdpi.apk",
        "config.en.apk",
        "config.fr.apk",
    ] {
        fs::write(dir.join(name), b"apk").unwrap();
    }
    dir
}

// ============================================================================
// Surface
// ============================================================================

#[test]
fn test_help_lists_commands() {
    let tmp = temp_dir();

    apkdeploy(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("profile"))
        .stdout(predicate::str::contains("resolve"))
        .stdout(predicate::str::contains("doctor"));
}

#[test]
fn test_install_requires_a_path() {
    let tmp = temp_dir();

    apkdeploy(tmp.path())
        .arg("install")
        .assert()
        .failure()
        .stderr(predicate::str::contains("PATH"));
}

#[test]
fn test_completions_bash() {
    let tmp = temp_dir();

    apkdeploy(tmp.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("apkdeploy"));
}

// ============================================================================
// apkdeploy install
// ============================================================================

#[test]
fn test_install_missing_file_reports_tally() {
    let tmp = temp_dir();

    apkdeploy(tmp.path())
        .args(["install", "missing.apk"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("1 attempted, 0 succeeded"))
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_install_unsupported_file() {
    let tmp = temp_dir();
    fs::write(tmp.path().join("notes.txt"), "not a package").unwrap();

    apkdeploy(tmp.path())
        .args(["install", "notes.txt"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("1 attempted, 0 succeeded"));
}

#[test]
fn test_invalid_explicit_config_fails() {
    let tmp = temp_dir();
    fs::write(tmp.path().join("bad.toml"), "[tools\nadb = ").unwrap();

    apkdeploy(tmp.path())
        .args(["--config", "bad.toml", "install", "app.apk"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse config file"));
}

// ============================================================================
// apkdeploy doctor
// ============================================================================

#[test]
fn test_doctor_without_adb_fails() {
    let tmp = temp_dir();

    apkdeploy(tmp.path())
        .args(["--adb", "/nonexistent/apkdeploy/adb", "doctor"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("apkdeploy doctor"))
        .stdout(predicate::str::contains("[!!] adb"));
}

// ============================================================================
// Fake device
// ============================================================================

#[cfg(unix)]
mod fake_device {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    const FAKE_ADB: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/adb.log"
if [ "$1" = "devices" ]; then
  printf 'List of devices attached\nemu\tdevice\n'
  exit 0
fi
if [ "$1" = "-s" ]; then
  shift 2
fi
case "$*" in
  "shell getprop ro.product.cpu.abi") echo arm64-v8a ;;
  "shell getprop ro.product.cpu.abilist") echo arm64-v8a,armeabi-v7a,armeabi ;;
  "shell getprop persist.sys.locale") echo en-US ;;
  "shell getprop ro.build.version.sdk") echo 33 ;;
  "shell getprop "*) echo ;;
  "shell wm density") echo "Physical density: 480" ;;
  "shell dumpsys package "*) echo "Unable to find package: $4" ;;
  install*) echo Success ;;
  *) echo "unexpected: $*" >&2; exit 1 ;;
esac
"#;

    /// Write the fake adb into `dir` and return its path.
    fn fake_adb(dir: &Path) -> PathBuf {
        let path = dir.join("adb");
        fs::write(&path, FAKE_ADB).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn adb_log(dir: &Path) -> String {
        fs::read_to_string(dir.join("adb.log")).unwrap_or_default()
    }

    #[test]
    fn test_profile_prints_device() {
        let tmp = temp_dir();
        let adb = fake_adb(tmp.path());

        apkdeploy(tmp.path())
            .arg("--adb")
            .arg(&adb)
            .arg("profile")
            .assert()
            .success()
            .stdout(predicate::str::contains("emu"))
            .stdout(predicate::str::contains("arm64-v8a"))
            .stdout(predicate::str::contains("480 dpi"))
            .stdout(predicate::str::contains("sdk:      33"));
    }

    #[test]
    fn test_profile_json() {
        let tmp = temp_dir();
        let adb = fake_adb(tmp.path());

        let output = apkdeploy(tmp.path())
            .env("APKDEPLOY_ADB", &adb)
            .args(["profile", "--json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(value[0]["serial"], "emu");
        assert_eq!(value[0]["sdk_version"], 33);
        assert_eq!(value[0]["locale"], "en");
    }

    #[test]
    fn test_profile_unknown_device_fails() {
        let tmp = temp_dir();
        let adb = fake_adb(tmp.path());

        apkdeploy(tmp.path())
            .arg("--adb")
            .arg(&adb)
            .args(["profile", "--device", "other"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("device `other` is not connected"));
    }

    #[test]
    fn test_resolve_selects_one_split_per_category() {
        let tmp = temp_dir();
        let adb = fake_adb(tmp.path());
        let app = write_xapk_dir(tmp.path());

        apkdeploy(tmp.path())
            .arg("--adb")
            .arg(&adb)
            .arg("resolve")
            .arg(&app)
            .assert()
            .success()
            .stdout(predicate::str::contains("base.apk"))
            .stdout(predicate::str::contains("config.arm64_v8a.apk"))
            .stdout(predicate::str::contains("config.xxhdpi.apk"))
            .stdout(predicate::str::contains("config.en.apk"))
            .stdout(predicate::str::contains("config.armeabi_v7a.apk").not())
            .stdout(predicate::str::contains("config.fr.apk").not());

        assert!(!adb_log(tmp.path()).contains("install"));
    }

    #[test]
    fn test_install_xapk_dir() {
        let tmp = temp_dir();
        let adb = fake_adb(tmp.path());
        let app = write_xapk_dir(tmp.path());

        apkdeploy(tmp.path())
            .arg("--adb")
            .arg(&adb)
            .arg("install")
            .arg(&app)
            .assert()
            .success()
            .stdout(predicate::str::contains("1 attempted, 1 succeeded"));

        let log = adb_log(tmp.path());
        let install = log
            .lines()
            .find(|l| l.contains("install-multiple"))
            .expect("no install-multiple call");
        assert!(install.starts_with("-s emu install-multiple -r -d"));
        assert!(install.contains("config.arm64_v8a.apk"));
        assert!(!install.contains("config.fr.apk"));
    }
}
