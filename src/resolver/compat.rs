//! SDK compatibility checks.

use crate::core::device::DeviceSnapshot;
use crate::core::error::{DeployError, DeployResult};
use crate::core::package::PackageDescriptor;

/// Check SDK bounds; returns a non-fatal warning when the device is newer
/// than the package target.
pub fn check_compatibility(
    device: &DeviceSnapshot,
    package: &PackageDescriptor,
) -> DeployResult<Option<DeployError>> {
    if device.sdk_version < package.min_sdk {
        return Err(DeployError::SdkTooLow {
            serial: device.serial.clone(),
            device_sdk: device.sdk_version,
            min_sdk: package.min_sdk,
        });
    }

    Ok(package
        .target_sdk
        .filter(|target| device.sdk_version > *target)
        .map(|target_sdk| DeployError::SdkTooHighWarning {
            serial: device.serial.clone(),
            device_sdk: device.sdk_version,
            target_sdk,
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{arm64_snapshot, split_descriptor};

    #[test]
    fn test_sdk_too_low_is_fatal() {
        let mut package = split_descriptor();
        package.min_sdk = 34;
        assert!(matches!(
            check_compatibility(&arm64_snapshot(), &package),
            Err(DeployError::SdkTooLow { min_sdk: 34, .. })
        ));
    }

    #[test]
    fn test_sdk_too_high_is_warning() {
        let mut package = split_descriptor();
        package.target_sdk = Some(30);
        let warning = check_compatibility(&arm64_snapshot(), &package).unwrap();
        assert!(matches!(
            warning,
            Some(DeployError::SdkTooHighWarning { target_sdk: 30, .. })
        ));
    }

    #[test]
    fn test_missing_target_is_fine() {
        let mut package = split_descriptor();
        package.target_sdk = None;
        assert!(check_compatibility(&arm64_snapshot(), &package)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_equal_bounds_pass() {
        let mut package = split_descriptor();
        package.min_sdk = 33;
        package.target_sdk = Some(33);
        assert!(check_compatibility(&arm64_snapshot(), &package)
            .unwrap()
            .is_none());
    }
}
