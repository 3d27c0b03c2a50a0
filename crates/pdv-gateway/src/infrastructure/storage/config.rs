//! Device file loading.
//!
//! The device file lists every PDV the gateway serves.  Two formats are
//! accepted, chosen by file extension:
//!
//! ```json
//! [
//!   {"pdv_ip": "192.168.0.21", "pdv_port": 38800,
//!    "dvr_ip": "192.168.0.5", "dvr_port": 38800, "origin_port": 38821},
//!   {"pdv_ip": "192.168.0.22", "pdv_port": "38801"}
//! ]
//! ```
//!
//! ```toml
//! [[devices]]
//! pdv_ip = "192.168.0.21"
//! pdv_port = 38800
//! dvr_ip = "192.168.0.5"
//! dvr_port = 38800
//! origin_port = 38821
//! ```
//!
//! Any other extension is read as JSON.
//!
//! Records are decoded one at a time: a malformed record is logged and
//! skipped, the rest still load.  A missing or unreadable file yields an
//! empty registry through [`load_device_registry_or_empty`], so the gateway
//! still serves the media channel without any PDV configured.

use std::path::{Path, PathBuf};

use pdv_core::{DeviceConfig, DeviceRegistry};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

/// Error type for device file operations.
#[derive(Debug, Error)]
pub enum DeviceFileError {
    /// The file could not be read.
    #[error("I/O error reading device file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The JSON document is not a list of records.
    #[error("failed to parse device file JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The TOML document is malformed.
    #[error("failed to parse device file TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Deserialize)]
struct TomlDeviceFile {
    #[serde(default)]
    devices: Vec<toml::Value>,
}

/// Reads and decodes the device file.
///
/// # Errors
///
/// Returns [`DeviceFileError::Io`] if the file cannot be read, or a parse
/// error if the document as a whole is malformed.  Individual bad records are
/// skipped, not reported as errors.
pub fn load_device_registry(path: &Path) -> Result<DeviceRegistry, DeviceFileError> {
    let content = std::fs::read_to_string(path).map_err(|source| DeviceFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));

    let configs = if is_toml {
        parse_toml(&content)?
    } else {
        parse_json(&content)?
    };

    let registry = DeviceRegistry::from_configs(configs);
    info!(path = %path.display(), devices = registry.len(), "device file loaded");
    Ok(registry)
}

/// Like [`load_device_registry`], but degrades to an empty registry on any
/// file-level error.
pub fn load_device_registry_or_empty(path: &Path) -> DeviceRegistry {
    match load_device_registry(path) {
        Ok(registry) => registry,
        Err(e) => {
            warn!("{e}; continuing with no devices");
            DeviceRegistry::empty()
        }
    }
}

fn parse_json(content: &str) -> Result<Vec<DeviceConfig>, DeviceFileError> {
    let records: Vec<serde_json::Value> = serde_json::from_str(content)?;
    Ok(records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match DeviceConfig::deserialize(record) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(index, "skipping malformed device record: {e}");
                None
            }
        })
        .collect())
}

fn parse_toml(content: &str) -> Result<Vec<DeviceConfig>, DeviceFileError> {
    let file: TomlDeviceFile = toml::from_str(content)?;
    Ok(file
        .devices
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match DeviceConfig::deserialize(record) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(index, "skipping malformed device record: {e}");
                None
            }
        })
        .collect())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
