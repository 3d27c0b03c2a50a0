//! Gateway runtime settings.
//!
//! [`GatewayConfig`] carries every setting that is not part of the device
//! file: listener addresses, the inactivity timeout, and the path of the
//! device file itself.  It is populated from CLI arguments (which also read
//! `PDV_*` environment variables) in `main.rs`, or from defaults in tests.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default port of the device-registration WebSocket channel.
pub const DEFAULT_DEVICE_WS_PORT: u16 = 8765;

/// Default port of the media-viewing WebSocket channel.
pub const DEFAULT_MEDIA_WS_PORT: u16 = 8080;

/// Default time a sale may stay open without activity before an alarm.
pub const DEFAULT_PDV_TIMEOUT: Duration = Duration::from_secs(180);

/// Default time a viewer has to send its quality choice after the source id.
pub const DEFAULT_QUALITY_WAIT: Duration = Duration::from_millis(1000);

/// All runtime configuration for the gateway.
///
/// # Example
///
/// ```rust
/// use pdv_gateway::domain::GatewayConfig;
///
/// let cfg = GatewayConfig::default();
/// assert_eq!(cfg.device_ws_addr.port(), 8765);
/// assert_eq!(cfg.pdv_timeout.as_secs(), 180);
/// ```
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address of the device-registration WebSocket listener.
    pub device_ws_addr: SocketAddr,

    /// Address of the media-viewing WebSocket listener.
    pub media_ws_addr: SocketAddr,

    /// How long an open sale may stay silent before subscribers are alarmed.
    pub pdv_timeout: Duration,

    /// Path of the device file (`.json` or `.toml`).
    pub device_file: PathBuf,

    /// How long a viewer session waits for the optional quality follow-up.
    pub quality_wait: Duration,
}

impl Default for GatewayConfig {
    /// | Field          | Default          |
    /// |----------------|------------------|
    /// | device_ws_addr | `0.0.0.0:8765`   |
    /// | media_ws_addr  | `0.0.0.0:8080`   |
    /// | pdv_timeout    | 180 seconds      |
    /// | device_file    | `./config.json`  |
    /// | quality_wait   | 1 second         |
    fn default() -> Self {
        let any = std::net::IpAddr::from([0, 0, 0, 0]);
        Self {
            device_ws_addr: SocketAddr::new(any, DEFAULT_DEVICE_WS_PORT),
            media_ws_addr: SocketAddr::new(any, DEFAULT_MEDIA_WS_PORT),
            pdv_timeout: DEFAULT_PDV_TIMEOUT,
            device_file: PathBuf::from("./config.json"),
            quality_wait: DEFAULT_QUALITY_WAIT,
        }
    }
}
