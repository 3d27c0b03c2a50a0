//! The media relay engine seam.
//!
//! A media relay engine pulls video from one source (typically an RTSP
//! camera), shapes it according to a [`QualityPreset`], and performs the
//! offer/answer handshake that lets a browser receive it.  The gateway never
//! inspects media or session descriptions; it only decides when an engine is
//! created, who shares it, and when it is closed.
//!
//! One engine instance serves every viewer of a source.  Each viewer gets its
//! own peer inside the engine, addressed by the viewer's [`SessionId`], so
//! one viewer's handshake or departure never touches another viewer's peer.

use std::sync::Arc;

use async_trait::async_trait;
use pdv_core::{QualityPreset, SessionDescription};
use thiserror::Error;

use crate::domain::SessionId;

/// Errors reported by a media relay engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to connect to media source {source_id}: {reason}")]
    Connect { source_id: String, reason: String },

    #[error("media engine is not connected")]
    NotConnected,

    #[error("no peer for viewer {0}")]
    UnknownViewer(SessionId),

    #[error("session handshake failed: {0}")]
    Handshake(String),

    #[error("media relay engine unavailable: {0}")]
    Unavailable(String),
}

/// One shared relay instance for a single media source.
#[async_trait]
pub trait MediaRelayEngine: Send + Sync {
    /// Opens the media source.  Called exactly once, before any handshake.
    async fn connect(&self, source_id: &str) -> Result<(), EngineError>;

    /// Creates a peer for `viewer` and returns its offer.  Calling it again
    /// for the same viewer replaces that viewer's peer.
    async fn create_offer(&self, viewer: SessionId) -> Result<SessionDescription, EngineError>;

    /// Applies the viewer's answer to its peer.
    async fn process_answer(
        &self,
        viewer: SessionId,
        answer: SessionDescription,
    ) -> Result<(), EngineError>;

    /// Closes the viewer's peer.  The instance itself stays up for the
    /// remaining viewers.
    async fn detach(&self, viewer: SessionId);

    /// Closes every peer and the media source.
    async fn close(&self);
}

/// Creates engine instances.  `create` must not block; the expensive work
/// happens in [`MediaRelayEngine::connect`].
pub trait MediaEngineFactory: Send + Sync {
    fn create(&self, source_id: &str, preset: QualityPreset) -> Arc<dyn MediaRelayEngine>;
}
