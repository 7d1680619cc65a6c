//! Core data structures for apkdeploy.
//!
//! - Device capability profile and density policy
//! - Package descriptors and variant entries
//! - The deployment error taxonomy

pub mod device;
pub mod error;
pub mod package;

pub use device::{DensityBand, DensityBucket, DensityPolicy, DeviceProfile, DeviceSnapshot};
pub use error::{DeployError, DeployResult};
pub use package::{
    Expansion, PackageDescriptor, PackageKind, SplitClassifier, VariantCategory, VariantEntry,
};
