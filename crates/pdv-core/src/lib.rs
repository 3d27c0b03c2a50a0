//! # pdv-core
//!
//! Shared library for the PDV relay gateway containing the device domain
//! model, the telegram classifier, the video quality presets, and the JSON
//! messages exchanged with browser clients.
//!
//! It has zero dependencies on sockets, async runtimes, or OS APIs, so every
//! type here can be unit-tested without a network.
//!
//! # Architecture overview (for beginners)
//!
//! A PDV (point-of-sale terminal) emits loosely structured text telegrams over
//! UDP while a cashier works.  The gateway relays those telegrams to a DVR,
//! watches them for the start and end of a sale, raises an alarm when a sale
//! stalls, and lets browser clients watch the store cameras next to the
//! telegram feed.
//!
//! This crate (`pdv-core`) is the shared foundation.  It defines:
//!
//! - **`domain`** – Devices and their configured endpoints, the heuristic
//!   telegram classifier, and the quality presets that shape a video relay.
//!
//! - **`protocol`** – The JSON messages spoken on the two client channels
//!   (device registration and media viewing).

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `pdv_core::DeviceConfig` instead of `pdv_core::domain::device::DeviceConfig`.
pub use domain::device::{DeviceConfig, DeviceId, DeviceRegistry, DownstreamTarget};
pub use domain::quality::QualityPreset;
pub use domain::telegram::{MarkerClassifier, TelegramClassifier, TelegramKind};
pub use protocol::messages::{DeviceCommand, DeviceEventMsg, SessionDescription, ViewerControl};
