//! Device control over adb.

pub mod channel;
pub mod device;
pub mod parse;

pub use channel::{AdbChannel, CommandOutput, DeviceChannel};
pub use device::{list_devices, usable_devices, Device};
pub use parse::{DeviceEntry, DeviceState, InstalledPackage};
