//! Storage: the device configuration file.

pub mod config;

pub use config::{load_device_registry, load_device_registry_or_empty, DeviceFileError};
