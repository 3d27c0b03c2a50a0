//! Application layer for pdv-gateway.
//!
//! The application layer knows *what* the gateway does: track sales, fan
//! telegrams out to subscribers, share media relays between viewers.  It
//! reaches browsers and media engines only through the [`MessageChannel`]
//! and [`MediaRelayEngine`] traits, so every use case here runs in tests
//! without a socket.
//!
//! # What does NOT belong here?
//!
//! - Binding sockets or accepting connections (infrastructure)
//! - WebSocket framing (tokio-tungstenite, in infrastructure)
//! - Reading the device file (infrastructure)

pub mod channel;
pub mod device_pump;
pub mod device_session;
pub mod fanout;
pub mod gateway;
pub mod media_engine;
pub mod media_sessions;
pub mod transaction_monitor;
pub mod viewer_session;

pub use channel::{ChannelError, MessageChannel};
pub use device_pump::{DeviceDatagram, DevicePump, PassThrough, TelegramFormatter};
pub use fanout::{SubscriberHandle, SubscriberRegistry, ViewerRegistry};
pub use gateway::Gateway;
pub use media_engine::{EngineError, MediaEngineFactory, MediaRelayEngine};
pub use media_sessions::{MediaHandshake, MediaSessionError, MediaSessionKey, MediaSessionRegistry};
pub use transaction_monitor::{AlarmTick, InactivityAlarm, TransactionMonitor, TransactionState};
