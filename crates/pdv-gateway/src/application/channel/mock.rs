//! In-memory [`MessageChannel`] for tests.
//!
//! [`MemoryChannel::pair`] returns the gateway-side channel and a
//! [`MemoryPeer`] that plays the browser: it injects inbound text, receives
//! whatever the gateway sends, and can hang up.

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::{ChannelError, MessageChannel};

/// What the simulated browser pushes into the channel.
#[derive(Debug)]
enum Inbound {
    Text(String),
    Fail(String),
}

/// Gateway side of an in-memory channel.
pub struct MemoryChannel {
    inbound: UnboundedReceiver<Inbound>,
    outbound: UnboundedSender<String>,
    closed: bool,
}

/// Browser side of an in-memory channel.
pub struct MemoryPeer {
    inbound: Option<UnboundedSender<Inbound>>,
    outbound: UnboundedReceiver<String>,
}

impl MemoryChannel {
    /// Creates a connected channel/peer pair.
    pub fn pair() -> (MemoryChannel, MemoryPeer) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (
            MemoryChannel {
                inbound: in_rx,
                outbound: out_tx,
                closed: false,
            },
            MemoryPeer {
                inbound: Some(in_tx),
                outbound: out_rx,
            },
        )
    }
}

#[async_trait]
impl MessageChannel for MemoryChannel {
    async fn recv(&mut self) -> Result<Option<String>, ChannelError> {
        if self.closed {
            return Ok(None);
        }
        match self.inbound.recv().await {
            Some(Inbound::Text(text)) => Ok(Some(text)),
            Some(Inbound::Fail(reason)) => Err(ChannelError::Transport(reason)),
            None => Ok(None),
        }
    }

    async fn send(&mut self, text: String) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        self.outbound.send(text).map_err(|_| ChannelError::Closed)
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

impl MemoryPeer {
    /// Sends a text message to the gateway.
    ///
    /// Panics if the peer already hung up.
    pub fn send(&self, text: impl Into<String>) {
        self.inbound
            .as_ref()
            .expect("peer already hung up")
            .send(Inbound::Text(text.into()))
            .expect("gateway side dropped");
    }

    /// Makes the gateway's next `recv` fail with a transport error.
    pub fn fail(&self, reason: impl Into<String>) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Inbound::Fail(reason.into()));
        }
    }

    /// Closes the browser-to-gateway direction, as a browser tab closing.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Waits for the next message the gateway sent.  `None` once the gateway
    /// side is dropped.
    pub async fn next(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Next message parsed as JSON.
    ///
    /// Panics if the gateway side closed or the text is not JSON.
    pub async fn next_json(&mut self) -> serde_json::Value {
        let text = self.next().await.expect("gateway side closed");
        serde_json::from_str(&text).expect("gateway sent invalid JSON")
    }

    /// A message that has already been sent, without waiting.
    pub fn try_next(&mut self) -> Option<String> {
        self.outbound.try_recv().ok()
    }
}
