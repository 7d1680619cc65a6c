//! apkdeploy - device-aware installer for Android split packages
//!
//! This crate provides the core library functionality for apkdeploy:
//! device profiling, variant resolution, installation with flag
//! degradation, and backup-based recovery.

pub mod adb;
pub mod core;
pub mod install;
pub mod ops;
pub mod resolver;
pub mod util;

/// Test utilities and mocks for apkdeploy unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides a scripted device channel, a scripted
/// prompter and fixtures.
#[cfg(test)]
pub mod test_support;

pub use crate::core::{DeployError, DeployResult, DeviceSnapshot, PackageDescriptor};
pub use resolver::{Resolution, VariantResolver};
