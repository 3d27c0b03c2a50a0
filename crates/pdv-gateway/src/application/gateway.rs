//! The gateway: shared registries plus the entry points the infrastructure
//! layer calls.
//!
//! [`Gateway`] is cheap to clone (every field is an `Arc`), so each accepted
//! connection gets its own copy.

use std::sync::Arc;
use std::time::Duration;

use pdv_core::{MarkerClassifier, TelegramClassifier};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::application::channel::MessageChannel;
use crate::application::device_pump::{DeviceDatagram, DevicePump};
use crate::application::device_session::run_device_session;
use crate::application::fanout::{SubscriberRegistry, ViewerRegistry};
use crate::application::media_engine::MediaEngineFactory;
use crate::application::media_sessions::MediaSessionRegistry;
use crate::application::viewer_session::{run_viewer_session, ViewerContext};
use crate::domain::session::new_session_id;
use crate::domain::GatewayConfig;

/// Datagrams buffered between the socket multiplexer and the device pump.
pub const DATAGRAM_BUFFER: usize = 1024;

#[derive(Clone)]
pub struct Gateway {
    subscribers: Arc<Mutex<SubscriberRegistry>>,
    viewers: Arc<Mutex<ViewerRegistry>>,
    media: Arc<MediaSessionRegistry>,
    pdv_timeout: Duration,
    quality_wait: Duration,
}

impl Gateway {
    pub fn new(config: &GatewayConfig, engines: Arc<dyn MediaEngineFactory>) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(SubscriberRegistry::new())),
            viewers: Arc::new(Mutex::new(ViewerRegistry::new())),
            media: Arc::new(MediaSessionRegistry::new(engines)),
            pdv_timeout: config.pdv_timeout,
            quality_wait: config.quality_wait,
        }
    }

    /// Starts the device pump with the default classifier.
    ///
    /// Returns the sender the socket multiplexer feeds and the pump task.
    /// The pump stops once every sender is dropped.
    pub fn spawn_device_pump(&self) -> (mpsc::Sender<DeviceDatagram>, JoinHandle<()>) {
        self.spawn_device_pump_with(MarkerClassifier::new())
    }

    /// Starts the device pump with a custom classifier.
    pub fn spawn_device_pump_with<C>(
        &self,
        classifier: C,
    ) -> (mpsc::Sender<DeviceDatagram>, JoinHandle<()>)
    where
        C: TelegramClassifier + 'static,
    {
        let (tx, rx) = mpsc::channel(DATAGRAM_BUFFER);
        let pump =
            DevicePump::with_classifier(classifier, self.pdv_timeout, Arc::clone(&self.subscribers));
        (tx, tokio::spawn(pump.run(rx)))
    }

    /// Serves one device-registration channel until it closes.
    pub async fn serve_device_channel<C: MessageChannel>(&self, mut channel: C) {
        let session = new_session_id();
        info!(%session, "device channel opened");
        match run_device_session(&mut channel, session, Arc::clone(&self.subscribers)).await {
            Ok(()) => info!(%session, "device channel closed"),
            Err(e) => warn!(%session, "device channel closed with error: {e}"),
        }
    }

    /// Serves one media-viewing channel until it closes.
    pub async fn serve_viewer_channel<C: MessageChannel>(&self, mut channel: C) {
        let session = new_session_id();
        info!(%session, "viewer channel opened");
        let ctx = ViewerContext {
            media: Arc::clone(&self.media),
            viewers: Arc::clone(&self.viewers),
            quality_wait: self.quality_wait,
        };
        match run_viewer_session(&mut channel, session, ctx).await {
            Ok(()) => info!(%session, "viewer channel closed"),
            Err(e) => warn!(%session, "viewer channel closed with error: {e}"),
        }
    }

    pub fn subscribers(&self) -> &Arc<Mutex<SubscriberRegistry>> {
        &self.subscribers
    }

    pub fn viewers(&self) -> &Arc<Mutex<ViewerRegistry>> {
        &self.viewers
    }

    pub fn media(&self) -> &Arc<MediaSessionRegistry> {
        &self.media
    }
}
