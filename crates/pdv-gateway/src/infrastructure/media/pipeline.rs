//! Capture-backed media relay engine.
//!
//! [`CapturePipelineEngine`] wires the pieces of one shared relay together:
//!
//! ```text
//!  FrameSource ──► FrameGrabber (thread) ──► FrameQueue ──► fan-out task
//!                                                              │ broadcast
//!                                          ┌───────────────────┼───────────┐
//!                                          ▼                   ▼           ▼
//!                                     MediaPeer(v1)      MediaPeer(v2)    ...
//! ```
//!
//! Every viewer gets its own [`MediaPeer`] subscribed to the broadcast, keyed
//! by the viewer's session id.  The peer implementation (the part that speaks
//! SDP and RTP to the browser) sits behind [`MediaPeerFactory`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pdv_core::{QualityPreset, SessionDescription};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::frame_queue::{FrameQueue, DEFAULT_FRAME_CAPACITY};
use super::grabber::{FrameGrabber, FrameSourceOpener, TimedFrame, STOP_GRACE};
use crate::application::media_engine::{EngineError, MediaEngineFactory, MediaRelayEngine};
use crate::domain::SessionId;

/// Frames buffered per viewer before a slow viewer starts skipping.
pub const PEER_FRAME_BACKLOG: usize = 30;

/// One viewer's end of the relay.
#[async_trait]
pub trait MediaPeer: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError>;
    async fn set_remote_description(&self, answer: SessionDescription) -> Result<(), EngineError>;
    async fn close(&self);
}

/// Builds peers fed by the relay's frame broadcast.
pub trait MediaPeerFactory: Send + Sync {
    fn new_peer(
        &self,
        viewer: SessionId,
        frames: broadcast::Receiver<Arc<TimedFrame>>,
    ) -> Result<Arc<dyn MediaPeer>, EngineError>;
}

struct Running {
    grabber: FrameGrabber,
    frames: broadcast::Sender<Arc<TimedFrame>>,
    fanout: JoinHandle<()>,
}

/// A [`MediaRelayEngine`] that captures from a [`FrameSourceOpener`] source.
pub struct CapturePipelineEngine {
    preset: QualityPreset,
    opener: Arc<dyn FrameSourceOpener>,
    peer_factory: Arc<dyn MediaPeerFactory>,
    running: Mutex<Option<Running>>,
    peers: Mutex<HashMap<SessionId, Arc<dyn MediaPeer>>>,
}

impl CapturePipelineEngine {
    pub fn new(
        preset: QualityPreset,
        opener: Arc<dyn FrameSourceOpener>,
        peer_factory: Arc<dyn MediaPeerFactory>,
    ) -> Self {
        Self {
            preset,
            opener,
            peer_factory,
            running: Mutex::new(None),
            peers: Mutex::new(HashMap::new()),
        }
    }

    pub fn preset(&self) -> QualityPreset {
        self.preset
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.lock().await.len()
    }

    pub async fn is_connected(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

#[async_trait]
impl MediaRelayEngine for CapturePipelineEngine {
    async fn connect(&self, source_id: &str) -> Result<(), EngineError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        // Opening an RTSP source blocks on the network.
        let opener = Arc::clone(&self.opener);
        let id = source_id.to_string();
        let source = tokio::task::spawn_blocking(move || opener.open(&id))
            .await
            .map_err(|e| EngineError::Connect {
                source_id: source_id.to_string(),
                reason: e.to_string(),
            })?
            .map_err(|e| EngineError::Connect {
                source_id: source_id.to_string(),
                reason: e.to_string(),
            })?;

        let queue = Arc::new(FrameQueue::new(DEFAULT_FRAME_CAPACITY));
        let grabber = FrameGrabber::spawn(source_id, source, self.preset, Arc::clone(&queue))
            .map_err(|e| EngineError::Connect {
                source_id: source_id.to_string(),
                reason: e.to_string(),
            })?;

        let (frames, _) = broadcast::channel(PEER_FRAME_BACKLOG);
        let tx = frames.clone();
        let fanout = tokio::spawn(async move {
            while let Some(frame) = queue.pop().await {
                // No subscribers yet is fine; the frame is simply dropped.
                let _ = tx.send(Arc::new(frame));
            }
        });

        info!(source = source_id, preset = %self.preset, "media relay connected");
        *running = Some(Running {
            grabber,
            frames,
            fanout,
        });
        Ok(())
    }

    async fn create_offer(&self, viewer: SessionId) -> Result<SessionDescription, EngineError> {
        let frames = match self.running.lock().await.as_ref() {
            Some(running) => running.frames.subscribe(),
            None => return Err(EngineError::NotConnected),
        };
        let peer = self.peer_factory.new_peer(viewer, frames)?;

        let replaced = self.peers.lock().await.insert(viewer, Arc::clone(&peer));
        if let Some(old) = replaced {
            debug!(%viewer, "replacing existing peer");
            old.close().await;
        }
        peer.create_offer().await
    }

    async fn process_answer(
        &self,
        viewer: SessionId,
        answer: SessionDescription,
    ) -> Result<(), EngineError> {
        let peer = self
            .peers
            .lock()
            .await
            .get(&viewer)
            .cloned()
            .ok_or(EngineError::UnknownViewer(viewer))?;
        peer.set_remote_description(answer).await
    }

    async fn detach(&self, viewer: SessionId) {
        let peer = self.peers.lock().await.remove(&viewer);
        if let Some(peer) = peer {
            peer.close().await;
            debug!(%viewer, "viewer peer closed");
        }
    }

    async fn close(&self) {
        let peers: Vec<_> = self.peers.lock().await.drain().map(|(_, p)| p).collect();
        for peer in peers {
            peer.close().await;
        }

        let Some(Running {
            mut grabber,
            frames,
            fanout,
        }) = self.running.lock().await.take()
        else {
            return;
        };
        drop(frames);

        // `stop` blocks for up to the grace period.
        let stopped = tokio::task::spawn_blocking(move || grabber.stop(STOP_GRACE)).await;
        match stopped {
            Ok(true) => {}
            Ok(false) => warn!("capture worker detached after grace period"),
            Err(e) => warn!("capture stop task failed: {e}"),
        }
        fanout.abort();
        info!(preset = %self.preset, "media relay closed");
    }
}

/// Creates [`CapturePipelineEngine`]s sharing one opener and peer factory.
pub struct CaptureEngineFactory {
    opener: Arc<dyn FrameSourceOpener>,
    peer_factory: Arc<dyn MediaPeerFactory>,
}

impl CaptureEngineFactory {
    pub fn new(opener: Arc<dyn FrameSourceOpener>, peer_factory: Arc<dyn MediaPeerFactory>) -> Self {
        Self {
            opener,
            peer_factory,
        }
    }
}

impl MediaEngineFactory for CaptureEngineFactory {
    fn create(&self, _source_id: &str, preset: QualityPreset) -> Arc<dyn MediaRelayEngine> {
        Arc::new(CapturePipelineEngine::new(
            preset,
            Arc::clone(&self.opener),
            Arc::clone(&self.peer_factory),
        ))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
