//! Device (PDV) configuration and the static, config-derived device registry.
//!
//! Each configured PDV has:
//!
//! - an **identity**: the IP address the terminal sends its telegrams from;
//! - a **listen endpoint**: the local UDP port the gateway receives them on
//!   (default 38800);
//! - an optional **downstream target**: the DVR address the raw telegram is
//!   relayed to, and the fixed local *origin port* the relay is sent from.
//!
//! # Why does the origin port matter?
//!
//! The DVR identifies which register a telegram belongs to by the UDP source
//! port of the datagram, not by its content.  Every device therefore gets its
//! own forward socket bound to exactly the configured origin port, and the
//! gateway must never let the OS pick an ephemeral port instead.
//!
//! # Immutability
//!
//! A [`DeviceConfig`] is never patched in place.  When the configuration
//! file changes, a whole new [`DeviceRegistry`] is built and handed to the
//! socket multiplexer, which swaps its sockets over.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

/// Identity of a device as it appears on the wire: the PDV's IP address in
/// text form (e.g. `"192.168.0.21"`).
pub type DeviceId = String;

/// Default UDP port a PDV sends its telegrams to.
pub const DEFAULT_LISTEN_PORT: u16 = 38800;

/// One configured PDV.
///
/// Field names follow the deployed `config.json` format, so an existing
/// configuration file deserializes without changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// IP address of the terminal; the device identity.
    pub pdv_ip: IpAddr,

    /// Local UDP port on which this device's telegrams arrive.
    #[serde(default = "default_listen_port", deserialize_with = "de_port")]
    pub pdv_port: u16,

    /// Local address the listen socket binds to.
    #[serde(default = "default_listen_address")]
    pub listen_address: IpAddr,

    /// DVR the raw telegrams are relayed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dvr_ip: Option<IpAddr>,

    /// DVR UDP port.
    #[serde(
        default,
        deserialize_with = "de_opt_port",
        skip_serializing_if = "Option::is_none"
    )]
    pub dvr_port: Option<u16>,

    /// Fixed local port the relay socket sends from.
    #[serde(
        default,
        deserialize_with = "de_opt_port",
        skip_serializing_if = "Option::is_none"
    )]
    pub origin_port: Option<u16>,
}

/// Where a device's telegrams are relayed to, and from which local port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DownstreamTarget {
    /// The DVR address (IP + port).
    pub peer: SocketAddr,
    /// The local port the forward socket is bound to.
    pub origin_port: u16,
}

impl DeviceConfig {
    /// Creates a device that only listens (no downstream relay).
    pub fn listen_only(pdv_ip: IpAddr, pdv_port: u16) -> Self {
        Self {
            pdv_ip,
            pdv_port,
            listen_address: default_listen_address(),
            dvr_ip: None,
            dvr_port: None,
            origin_port: None,
        }
    }

    /// Creates a device that relays to `peer` from local port `origin_port`.
    pub fn relaying(pdv_ip: IpAddr, pdv_port: u16, peer: SocketAddr, origin_port: u16) -> Self {
        Self {
            pdv_ip,
            pdv_port,
            listen_address: default_listen_address(),
            dvr_ip: Some(peer.ip()),
            dvr_port: Some(peer.port()),
            origin_port: Some(origin_port),
        }
    }

    /// The device identity in wire form.
    pub fn id(&self) -> DeviceId {
        self.pdv_ip.to_string()
    }

    /// The local address the listen socket binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.pdv_port)
    }

    /// Returns the downstream target when all three relay fields are present.
    ///
    /// A record missing any of `dvr_ip`, `dvr_port`, or `origin_port` still
    /// gets a listen socket, but its telegrams are not relayed anywhere.
    pub fn downstream(&self) -> Option<DownstreamTarget> {
        match (self.dvr_ip, self.dvr_port, self.origin_port) {
            (Some(ip), Some(port), Some(origin_port)) => Some(DownstreamTarget {
                peer: SocketAddr::new(ip, port),
                origin_port,
            }),
            _ => None,
        }
    }
}

// ── Static device registry ────────────────────────────────────────────────────

/// Ordered, read-only set of configured devices keyed by identity.
///
/// Built once from the configuration file and replaced wholesale on reload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRegistry {
    devices: Vec<DeviceConfig>,
    index: HashMap<DeviceId, usize>,
}

impl DeviceRegistry {
    /// Creates an empty registry (the degraded state after a config error).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a registry preserving configuration order.
    ///
    /// When two records share an identity, the first one wins and the
    /// duplicate is logged and dropped.
    pub fn from_configs(configs: impl IntoIterator<Item = DeviceConfig>) -> Self {
        let mut registry = Self::default();
        for config in configs {
            let id = config.id();
            if registry.index.contains_key(&id) {
                warn!(device = %id, "duplicate device record ignored");
                continue;
            }
            registry.index.insert(id, registry.devices.len());
            registry.devices.push(config);
        }
        registry
    }

    /// Looks up a device by identity.
    pub fn get(&self, id: &str) -> Option<&DeviceConfig> {
        self.index.get(id).map(|&i| &self.devices[i])
    }

    /// Iterates devices in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceConfig> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

// ── Serde helpers ─────────────────────────────────────────────────────────────

fn default_listen_port() -> u16 {
    DEFAULT_LISTEN_PORT
}

fn default_listen_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

/// Ports appear both as numbers and as quoted strings in deployed files.
#[derive(Deserialize)]
#[serde(untagged)]
enum PortRepr {
    Number(u16),
    Text(String),
}

impl PortRepr {
    fn into_port<E: serde::de::Error>(self) -> Result<u16, E> {
        match self {
            PortRepr::Number(n) => Ok(n),
            PortRepr::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid port: {s:?}"))),
        }
    }
}

fn de_port<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    PortRepr::deserialize(deserializer)?.into_port()
}

fn de_opt_port<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u16>, D::Error> {
    Option::<PortRepr>::deserialize(deserializer)?
        .map(PortRepr::into_port)
        .transpose()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
