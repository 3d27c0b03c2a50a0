//! pdv-gateway library crate.
//!
//! This crate relays PDV (point-of-sale) telegrams to a DVR, watches them for
//! stalled sales, and serves browser clients over two WebSocket channels: one
//! for the telegram feed and alarms, one for camera relays.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! PDV terminals (UDP)                     Browsers (JSON over WebSocket)
//!        │                                          ↕
//! [pdv-gateway]                                     │
//!   ├── domain/           GatewayConfig, session identity
//!   ├── application/
//!   │     ├── transaction_monitor   per-device sale state machine + timers
//!   │     ├── fanout                device subscribers, live viewers
//!   │     ├── media_sessions        refcounted media relay instances
//!   │     ├── device_pump           datagram → monitor → subscribers
//!   │     ├── device_session        registration channel driver
//!   │     ├── viewer_session        media-viewing channel driver
//!   │     └── gateway               owns the registries, wires it together
//!   └── infrastructure/
//!         ├── network/socket_mux    per-device listen/forward UDP sockets
//!         ├── network/ws_server     WebSocket accept loops (tokio-tungstenite)
//!         ├── storage/config        device configuration file
//!         └── media/                capture worker thread + frame queue
//!        │
//! DVR (UDP, fixed origin port per PDV)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O.
//! - `application` depends on `domain` and `pdv-core`, and reaches the
//!   outside world only through the traits it defines (`MessageChannel`,
//!   `MediaRelayEngine`).
//! - `infrastructure` implements those traits with tokio, tungstenite, and
//!   OS threads.

/// Domain layer: configuration and identity types (no I/O).
pub mod domain;

/// Application layer: registries, state machines, and session drivers.
pub mod application;

/// Infrastructure layer: sockets, WebSocket servers, storage, capture.
pub mod infrastructure;
