//! WebSocket servers: accept loops and the [`MessageChannel`] adapter.
//!
//! The gateway runs two independent listeners:
//!
//! | Channel             | Default port | Handler                              |
//! |---------------------|--------------|--------------------------------------|
//! | device registration | 8765         | [`Gateway::serve_device_channel`]    |
//! | media viewing       | 8080         | [`Gateway::serve_viewer_channel`]    |
//!
//! Each accepted TCP connection is upgraded to a WebSocket and handed to its
//! own Tokio task, so one slow browser never delays another.  The accept
//! loop wakes every 200 ms to check the shared `running` flag, which `main`
//! clears on Ctrl+C.
//!
//! WebSocket ping/pong is answered by tokio-tungstenite itself; only text
//! frames reach the session drivers.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::application::channel::{ChannelError, MessageChannel};
use crate::application::Gateway;

/// How often the accept loop re-checks the `running` flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Which browser channel a listener serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Device,
    Viewer,
}

impl ChannelKind {
    fn label(self) -> &'static str {
        match self {
            ChannelKind::Device => "device",
            ChannelKind::Viewer => "media",
        }
    }
}

// ── MessageChannel over WebSocket ─────────────────────────────────────────────

/// A browser WebSocket connection as a [`MessageChannel`].
pub struct WsChannel {
    stream: WebSocketStream<TcpStream>,
    peer: SocketAddr,
}

impl WsChannel {
    pub fn new(stream: WebSocketStream<TcpStream>, peer: SocketAddr) -> Self {
        Self { stream, peer }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait]
impl MessageChannel for WsChannel {
    async fn recv(&mut self) -> Result<Option<String>, ChannelError> {
        loop {
            match self.stream.next().await {
                None => return Ok(None),
                Some(Ok(WsMessage::Text(text))) => return Ok(Some(text)),
                Some(Ok(WsMessage::Close(_))) => return Ok(None),
                Some(Ok(WsMessage::Binary(_))) => {
                    debug!(peer = %self.peer, "ignoring binary frame");
                }
                // Ping, Pong, raw frames: handled by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => return Ok(None),
                Some(Err(e)) => return Err(ChannelError::Transport(e.to_string())),
            }
        }
    }

    async fn send(&mut self, text: String) -> Result<(), ChannelError> {
        self.stream
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| match e {
                WsError::ConnectionClosed | WsError::AlreadyClosed => ChannelError::Closed,
                other => ChannelError::Transport(other.to_string()),
            })
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

/// Binds `addr` and serves `kind` until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound.
pub async fn run_server(
    addr: SocketAddr,
    kind: ChannelKind,
    gateway: Gateway,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {} WebSocket listener on {addr}", kind.label()))?;
    serve(listener, kind, gateway, running).await
}

/// Serves an already-bound listener until `running` is cleared.
pub async fn serve(
    listener: TcpListener,
    kind: ChannelKind,
    gateway: Gateway,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let local = listener.local_addr().context("listener has no local address")?;
    info!("{} WebSocket channel listening on {local}", kind.label());

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping {} accept loop", kind.label());
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                debug!("new {} connection from {peer}", kind.label());
                let gateway = gateway.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer, kind, gateway).await;
                });
            }
            Ok(Err(e)) => {
                // Transient (e.g. out of file descriptors); keep accepting.
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, kind: ChannelKind, gateway: Gateway) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {peer} failed: {e}");
            return;
        }
    };
    let channel = WsChannel::new(ws, peer);
    match kind {
        ChannelKind::Device => gateway.serve_device_channel(channel).await,
        ChannelKind::Viewer => gateway.serve_viewer_channel(channel).await,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
