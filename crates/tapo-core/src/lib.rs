//! Tapo Core - Core types for locating and classifying Tapo devices
//!
//! This crate provides the foundational types for the tapo-link system:
//! - Address descriptors (IP or MAC) and their validation
//! - Located and managed devices with a refreshable IP address
//! - Device kind classification and accessory class dispatch

pub mod accessory;
pub mod address;
pub mod device;

pub use accessory::{AccessoryClass, ChildKind, DeviceKind};
pub use address::{validate, AddressDescriptor, AddressKind, MacAddress};
pub use device::{derive_uuid, DeviceHandle, IpResolver, LocatedDevice, ManagedDevice};
