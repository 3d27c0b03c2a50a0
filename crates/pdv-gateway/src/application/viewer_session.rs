//! Media-viewing session driver.
//!
//! ```text
//! browser ──"rtsp://cam/stream"──────────► source id
//! browser ──{"quality":"high"}───────────► optional, waited for briefly
//! gateway ──{"sdp":…,"type":"offer"}─────► browser
//! browser ──{"sdp":…,"type":"answer"}────► gateway
//!   … then, any number of times …
//! browser ──{"change_quality":"low"}─────► release, re-acquire, new offer/answer
//! browser ──CLOSE────────────────────────► end of session
//! ```
//!
//! Whatever ends the session (CLOSE, the browser disconnecting, a transport
//! error, an engine failure, or the task being dropped), the viewer's media
//! hold is released and the viewer is removed from the live set exactly
//! once.

use std::sync::Arc;
use std::time::Duration;

use pdv_core::{protocol::messages::ViewerNotice, QualityPreset, SessionDescription, ViewerControl};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::application::channel::{ChannelError, MessageChannel};
use crate::application::fanout::ViewerRegistry;
use crate::application::media_engine::EngineError;
use crate::application::media_sessions::{
    MediaHandshake, MediaSessionError, MediaSessionKey, MediaSessionRegistry,
};
use crate::domain::SessionId;

/// Why a viewer session ended abnormally.
#[derive(Debug, Error)]
pub enum ViewerSessionError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Media(#[from] MediaSessionError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("invalid session answer: {0}")]
    InvalidAnswer(String),

    #[error("empty media source id")]
    EmptySource,
}

/// Shared state a viewer session needs.
#[derive(Clone)]
pub struct ViewerContext {
    pub media: Arc<MediaSessionRegistry>,
    pub viewers: Arc<Mutex<ViewerRegistry>>,
    pub quality_wait: Duration,
}

/// Outcome of waiting for the browser's answer.
enum Negotiated {
    Done,
    Closed,
}

/// Runs one media-viewing session to completion.
pub async fn run_viewer_session<C: MessageChannel>(
    channel: &mut C,
    session: SessionId,
    ctx: ViewerContext,
) -> Result<(), ViewerSessionError> {
    let mut teardown = ViewerTeardown::new(session, &ctx);
    let result = drive(channel, session, &ctx, &mut teardown).await;

    if let Err(e) = &result {
        if notify_browser(e) {
            let notice = ViewerNotice::Error {
                message: e.to_string(),
            };
            if let Ok(json) = serde_json::to_string(&notice) {
                let _ = channel.send(json).await;
            }
        }
    }

    teardown.run().await;
    channel.close().await;
    result
}

/// Errors worth telling the browser about before hanging up.
fn notify_browser(e: &ViewerSessionError) -> bool {
    !matches!(e, ViewerSessionError::Channel(_))
}

async fn drive<C: MessageChannel>(
    channel: &mut C,
    session: SessionId,
    ctx: &ViewerContext,
    teardown: &mut ViewerTeardown,
) -> Result<(), ViewerSessionError> {
    // ── Source id and optional quality choice ─────────────────────────────────
    let Some(first) = channel.recv().await? else {
        return Ok(());
    };
    let source_id = first.trim().to_string();
    if source_id.is_empty() {
        return Err(ViewerSessionError::EmptySource);
    }

    let mut quality = QualityPreset::DEFAULT.name.to_string();
    match tokio::time::timeout(ctx.quality_wait, channel.recv()).await {
        Ok(Ok(Some(text))) => match ViewerControl::parse(&text) {
            ViewerControl::Quality(name) => quality = name,
            ViewerControl::Close => return Ok(()),
            _ => debug!(%session, "ignoring unexpected message before handshake"),
        },
        Ok(Ok(None)) => return Ok(()),
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => debug!(%session, "no quality choice; using default"),
    }

    info!(%session, source = %source_id, quality = %quality, "viewer connected");
    ctx.viewers
        .lock()
        .await
        .join(session, &source_id, QualityPreset::resolve(&quality));
    teardown.joined = true;

    // ── Acquire and negotiate ─────────────────────────────────────────────────
    let handshake = ctx.media.acquire(&source_id, &quality, session).await?;
    teardown.key = Some(handshake.key().clone());
    if let Negotiated::Closed = negotiate(channel, &handshake, ctx).await? {
        return Ok(());
    }

    // ── Control loop ──────────────────────────────────────────────────────────
    loop {
        let Some(text) = channel.recv().await? else {
            return Ok(());
        };
        match ViewerControl::parse(&text) {
            ViewerControl::Close => {
                debug!(%session, "viewer sent CLOSE");
                return Ok(());
            }
            ViewerControl::ChangeQuality(name) => {
                let Some(key) = teardown.key.take() else {
                    return Ok(());
                };
                info!(%session, source = %key.source_id, quality = %name, "changing quality");
                let handshake = ctx.media.change_quality(&key, &name).await?;
                teardown.key = Some(handshake.key().clone());
                ctx.viewers
                    .lock()
                    .await
                    .set_quality(session, QualityPreset::resolve(&name));
                if let Negotiated::Closed = negotiate(channel, &handshake, ctx).await? {
                    return Ok(());
                }
            }
            ViewerControl::Quality(_) | ViewerControl::Unrecognized => {
                debug!(%session, "ignoring viewer message");
            }
        }
    }
}

/// Sends an offer and applies the browser's answer.
async fn negotiate<C: MessageChannel>(
    channel: &mut C,
    handshake: &MediaHandshake,
    ctx: &ViewerContext,
) -> Result<Negotiated, ViewerSessionError> {
    let offer = handshake.create_offer().await?;
    let json =
        serde_json::to_string(&offer).map_err(|e| EngineError::Handshake(e.to_string()))?;
    channel.send(json).await?;

    let Some(text) = channel.recv().await? else {
        return Ok(Negotiated::Closed);
    };
    if ViewerControl::parse(&text) == ViewerControl::Close {
        return Ok(Negotiated::Closed);
    }
    let answer: SessionDescription = serde_json::from_str(&text)
        .map_err(|e| ViewerSessionError::InvalidAnswer(e.to_string()))?;

    handshake.process_answer(answer).await?;
    ctx.media.mark_handshake_complete(handshake.key()).await;
    debug!(source = %handshake.key().source_id, "handshake complete");
    Ok(Negotiated::Done)
}

/// Releases a viewer's media hold and live-set entry, exactly once.
struct ViewerTeardown {
    session: SessionId,
    media: Arc<MediaSessionRegistry>,
    viewers: Arc<Mutex<ViewerRegistry>>,
    key: Option<MediaSessionKey>,
    joined: bool,
    done: bool,
}

impl ViewerTeardown {
    fn new(session: SessionId, ctx: &ViewerContext) -> Self {
        Self {
            session,
            media: Arc::clone(&ctx.media),
            viewers: Arc::clone(&ctx.viewers),
            key: None,
            joined: false,
            done: false,
        }
    }

    async fn run(&mut self) {
        if std::mem::replace(&mut self.done, true) {
            return;
        }
        release(
            self.session,
            &self.media,
            &self.viewers,
            self.key.take(),
            self.joined,
        )
        .await;
    }
}

async fn release(
    session: SessionId,
    media: &MediaSessionRegistry,
    viewers: &Mutex<ViewerRegistry>,
    key: Option<MediaSessionKey>,
    joined: bool,
) {
    if let Some(key) = key {
        media.release(&key).await;
    }
    if joined {
        if let Some((source, remaining)) = viewers.lock().await.leave(session) {
            info!(%session, %source, remaining, "viewer left");
        }
    }
}

impl Drop for ViewerTeardown {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let session = self.session;
        let media = Arc::clone(&self.media);
        let viewers = Arc::clone(&self.viewers);
        let key = self.key.take();
        let joined = self.joined;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    release(session, &media, &viewers, key, joined).await;
                });
            }
            Err(_) => warn!(%session, "viewer dropped outside the runtime; media hold leaked"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
