//! Bidirectional text-message channel between the gateway and one browser.
//!
//! Both session drivers (device registration and media viewing) talk to the
//! browser only through [`MessageChannel`].  The WebSocket server implements
//! it over tokio-tungstenite; tests use [`mock::MemoryChannel`].

pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a [`MessageChannel`].
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The peer went away while a message was being sent.
    #[error("channel closed by peer")]
    Closed,

    /// The underlying transport failed.
    #[error("channel transport error: {0}")]
    Transport(String),
}

/// One browser connection carrying text messages in both directions.
///
/// `recv` must be cancel-safe: session drivers race it against outbound
/// events and timeouts, and a cancelled `recv` must not lose a message.
#[async_trait]
pub trait MessageChannel: Send {
    /// Waits for the next text message.
    ///
    /// Returns `Ok(None)` once the peer has closed the channel.
    async fn recv(&mut self) -> Result<Option<String>, ChannelError>;

    /// Sends one text message.
    async fn send(&mut self, text: String) -> Result<(), ChannelError>;

    /// Closes the channel.  Best effort; errors are ignored.
    async fn close(&mut self);
}
