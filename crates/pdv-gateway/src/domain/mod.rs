//! Domain layer for pdv-gateway.
//!
//! Pure types with no I/O: the runtime settings and the identity of a browser
//! session.  The device model itself lives in `pdv-core`.

pub mod config;
pub mod session;

pub use config::GatewayConfig;
pub use session::SessionId;
