//! High-level operations.
//!
//! This module contains the implementation of apkdeploy commands.

pub mod bundle;
pub mod deploy;
pub mod doctor;
pub mod inspect;
pub mod package_loader;

pub use bundle::BundleTool;
pub use deploy::{BatchReport, DeployOptions, Installed, ItemReport, Orchestrator};
pub use doctor::{doctor, format_report, CheckResult, DoctorReport};
pub use inspect::{inspect_apk, ApkInfo};
pub use package_loader::{LoadedPackage, PackageLoader, Payload};
