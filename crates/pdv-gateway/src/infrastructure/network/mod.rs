//! Network infrastructure: PDV UDP sockets and browser WebSocket listeners.

pub mod socket_mux;
pub mod ws_server;

pub use socket_mux::{ApplyReport, SocketError, SocketMultiplexer};
pub use ws_server::{run_server, ChannelKind, WsChannel};
