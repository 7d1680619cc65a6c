//! Environment health checks.
//!
//! The `doctor` command verifies that the external tools apkdeploy drives
//! are reachable.
//!
//! ## Usage
//!
//! ```bash
//! apkdeploy doctor           # Quick check
//! apkdeploy -v doctor        # Detailed output
//! ```
//!
//! ## Checks Performed
//!
//! - adb (required)
//! - Connected devices, through adb (optional)
//! - aapt, for apk introspection (optional; the manifest is decoded directly otherwise)
//! - Java runtime and bundletool jar, for `.apks` and `.aab` packages (optional)

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::adb::{list_devices, AdbChannel};
use crate::util::config::Tools;
use crate::util::process::{find_executable, ProcessBuilder};

/// Result of a single health check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Name of the check
    pub name: String,

    /// Whether the check passed
    pub passed: bool,

    /// Human-readable status message
    pub message: String,

    /// Path to the tool (if applicable)
    pub path: Option<PathBuf>,

    /// Version string (if applicable)
    pub version: Option<String>,

    /// How long the check took
    pub duration: Duration,

    /// Whether this check is required or optional
    pub required: bool,
}

impl CheckResult {
    /// Create a passing check result.
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        CheckResult {
            name: name.into(),
            passed: true,
            message: message.into(),
            path: None,
            version: None,
            duration: Duration::ZERO,
            required: true,
        }
    }

    /// Create a failing check result.
    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        CheckResult {
            name: name.into(),
            passed: false,
            message: message.into(),
            path: None,
            version: None,
            duration: Duration::ZERO,
            required: true,
        }
    }

    /// Mark this check as optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Summary of all health checks.
#[derive(Debug, Clone, Default)]
pub struct DoctorReport {
    /// Individual check results
    pub checks: Vec<CheckResult>,

    /// Total time taken
    pub total_duration: Duration,

    /// Environment information
    pub environment: HashMap<String, String>,
}

impl DoctorReport {
    pub fn new() -> Self {
        DoctorReport::default()
    }

    pub fn add(&mut self, check: CheckResult) {
        self.checks.push(check);
    }

    /// Check if all required checks passed.
    pub fn all_required_passed(&self) -> bool {
        self.checks.iter().filter(|c| c.required).all(|c| c.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }

    pub fn required_failed_count(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.required && !c.passed)
            .count()
    }
}

/// Run every check against the resolved tool paths.
pub fn doctor(tools: &Tools) -> Result<DoctorReport> {
    let start = Instant::now();
    let mut report = DoctorReport::new();

    report
        .environment
        .insert("os".to_string(), std::env::consts::OS.to_string());
    report
        .environment
        .insert("arch".to_string(), std::env::consts::ARCH.to_string());

    let adb = check_tool("adb", &tools.adb, &["version"], true);
    let adb_ok = adb.passed;
    report.add(adb);
    if adb_ok {
        report.add(check_devices(&tools.adb));
    }
    report.add(check_tool("aapt", &tools.aapt, &["version"], false));
    report.add(check_tool("java", &tools.java, &["-version"], false));
    report.add(check_bundletool(&tools.bundletool));

    report.total_duration = start.elapsed();
    Ok(report)
}

/// Run `<tool> <version args>` and record the first output line.
fn check_tool(name: &str, program: &Path, version_args: &[&str], required: bool) -> CheckResult {
    let start = Instant::now();
    let finish = |result: CheckResult| {
        let result = result.with_duration(start.elapsed());
        if required {
            result
        } else {
            result.optional()
        }
    };

    match ProcessBuilder::new(program).args(version_args).exec() {
        Ok(output) if output.status.success() => {
            // java prints its version to stderr
            let text = if output.stdout.is_empty() {
                String::from_utf8_lossy(&output.stderr).into_owned()
            } else {
                String::from_utf8_lossy(&output.stdout).into_owned()
            };
            let version = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("unknown version");
            let path = find_executable(&program.to_string_lossy()).unwrap_or_else(|| program.to_path_buf());
            finish(
                CheckResult::pass(name, format!("{} is available", name))
                    .with_path(path)
                    .with_version(version.to_string()),
            )
        }
        Ok(output) => finish(CheckResult::fail(
            name,
            format!("`{}` exited with {:?}", program.display(), output.status.code()),
        )),
        Err(_) => finish(CheckResult::fail(
            name,
            format!("{} not found (looked for `{}`)", name, program.display()),
        )),
    }
}

fn check_devices(adb: &Path) -> CheckResult {
    let start = Instant::now();
    let channel = AdbChannel::new(adb);
    let result = match list_devices(&channel) {
        Ok(devices) => {
            let usable = devices.iter().filter(|d| d.state.is_usable()).count();
            let skipped = devices.len() - usable;
            let message = match (usable, skipped) {
                (0, 0) => "no devices connected".to_string(),
                (n, 0) => format!("{} device(s) ready", n),
                (n, s) => format!("{} device(s) ready, {} offline or unauthorized", n, s),
            };
            if usable > 0 {
                CheckResult::pass("devices", message)
            } else {
                CheckResult::fail("devices", message)
            }
        }
        Err(err) => CheckResult::fail("devices", format!("`adb devices` failed: {:#}", err)),
    };
    result.with_duration(start.elapsed()).optional()
}

fn check_bundletool(jar: &Path) -> CheckResult {
    if jar.is_file() {
        CheckResult::pass("bundletool", "bundletool jar found")
            .with_path(jar.to_path_buf())
            .optional()
    } else {
        CheckResult::fail(
            "bundletool",
            format!(
                "{} not found (optional, needed for .apks and .aab packages)",
                jar.display()
            ),
        )
        .optional()
    }
}

/// Format the doctor report for display.
pub fn format_report(report: &DoctorReport, verbose: bool) -> String {
    use std::fmt::Write;

    let mut output = String::new();

    let _ = writeln!(output, "apkdeploy doctor");
    let _ = writeln!(output, "================\n");

    if verbose {
        let unknown = "unknown".to_string();
        let _ = writeln!(output, "Environment:");
        let _ = writeln!(
            output,
            "  OS: {} ({})",
            report.environment.get("os").unwrap_or(&unknown),
            report.environment.get("arch").unwrap_or(&unknown)
        );
        let _ = writeln!(output);
    }

    let _ = writeln!(output, "Checks:");
    for check in &report.checks {
        let status = if check.passed { "[OK]" } else { "[!!]" };
        let required = if check.required { "" } else { " (optional)" };

        let _ = writeln!(output, "  {} {}{}", status, check.name, required);

        if verbose || !check.passed {
            let _ = writeln!(output, "      {}", check.message);
        }
        if verbose {
            if let Some(path) = &check.path {
                let _ = writeln!(output, "      Path: {}", path.display());
            }
            if let Some(version) = &check.version {
                let _ = writeln!(output, "      Version: {}", version);
            }
        }
    }

    let _ = writeln!(output);

    let passed = report.passed_count();
    let failed = report.failed_count();
    let required_failed = report.required_failed_count();

    let _ = writeln!(output, "Summary: {} passed, {} failed", passed, failed);

    if required_failed > 0 {
        let _ = writeln!(
            output,
            "\nWarning: {} required check(s) failed. Installs will not work.",
            required_failed
        );
    } else if failed > 0 {
        let _ = writeln!(
            output,
            "\nAll required checks passed. {} optional check(s) failed.",
            failed
        );
    } else {
        let _ = writeln!(output, "\nAll checks passed. apkdeploy is ready to use.");
    }

    output
}
