//! The device event pump.
//!
//! One task owns the [`TransactionMonitor`] and serialises everything that
//! touches it: datagrams surfaced by the socket multiplexer and ticks from
//! the monitor's own timers.  For each datagram it:
//!
//! 1. decodes the payload as UTF-8, dropping invalid bytes,
//! 2. feeds the text to the monitor,
//! 3. passes it through the [`TelegramFormatter`] hook,
//! 4. publishes a `pdv_data` event to the device's subscribers.
//!
//! Relaying to the DVR happens before the datagram reaches the pump, in the
//! socket multiplexer.

use std::sync::Arc;

use pdv_core::{DeviceEventMsg, DeviceId, MarkerClassifier, TelegramClassifier};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, trace};

use crate::application::fanout::SubscriberRegistry;
use crate::application::transaction_monitor::{AlarmTick, TransactionMonitor};

/// One datagram received from a PDV, already attributed to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDatagram {
    pub device: DeviceId,
    pub payload: Vec<u8>,
}

impl DeviceDatagram {
    pub fn new(device: impl Into<DeviceId>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            device: device.into(),
            payload: payload.into(),
        }
    }
}

/// Hook applied to every telegram before it is published.
///
/// Deployments that need to reshape telegram text for the browser plug in
/// here.  The default leaves the text untouched.
pub trait TelegramFormatter: Send + Sync {
    fn format(&self, device: &str, telegram: String) -> String;
}

/// Publishes telegrams exactly as received.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl TelegramFormatter for PassThrough {
    fn format(&self, _device: &str, telegram: String) -> String {
        telegram
    }
}

/// Decodes a datagram payload, dropping byte sequences that are not UTF-8.
pub fn decode_telegram(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => String::from_utf8_lossy(payload)
            .chars()
            .filter(|c| *c != char::REPLACEMENT_CHARACTER)
            .collect(),
    }
}

/// The task that owns the transaction monitor.
pub struct DevicePump<C: TelegramClassifier = MarkerClassifier> {
    monitor: TransactionMonitor<C>,
    alarms: mpsc::UnboundedReceiver<AlarmTick>,
    subscribers: Arc<Mutex<SubscriberRegistry>>,
    formatter: Arc<dyn TelegramFormatter>,
}

impl DevicePump<MarkerClassifier> {
    pub fn new(timeout: std::time::Duration, subscribers: Arc<Mutex<SubscriberRegistry>>) -> Self {
        Self::with_classifier(MarkerClassifier::new(), timeout, subscribers)
    }
}

impl<C: TelegramClassifier> DevicePump<C> {
    pub fn with_classifier(
        classifier: C,
        timeout: std::time::Duration,
        subscribers: Arc<Mutex<SubscriberRegistry>>,
    ) -> Self {
        let (alarm_tx, alarms) = mpsc::unbounded_channel();
        Self {
            monitor: TransactionMonitor::with_classifier(classifier, timeout, alarm_tx),
            alarms,
            subscribers,
            formatter: Arc::new(PassThrough),
        }
    }

    /// Replaces the telegram formatter.
    pub fn with_formatter(mut self, formatter: Arc<dyn TelegramFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// Runs until the datagram channel closes.
    pub async fn run(mut self, mut datagrams: mpsc::Receiver<DeviceDatagram>) {
        info!(timeout_secs = self.monitor.timeout().as_secs(), "device pump started");
        loop {
            tokio::select! {
                maybe = datagrams.recv() => match maybe {
                    Some(datagram) => self.on_datagram(datagram).await,
                    None => break,
                },
                Some(tick) = self.alarms.recv() => self.on_alarm(tick).await,
            }
        }
        info!("device pump stopped");
    }

    async fn on_datagram(&mut self, datagram: DeviceDatagram) {
        let DeviceDatagram { device, payload } = datagram;
        let text = decode_telegram(&payload);

        let kind = self.monitor.observe(&device, &text);
        trace!(device = %device, ?kind, bytes = payload.len(), "telegram");

        let data = self.formatter.format(&device, text);
        let event = DeviceEventMsg::PdvData {
            pdv_ip: device.clone(),
            data,
        };
        let report = self.subscribers.lock().await.publish(&device, &event);
        if report.failed > 0 {
            debug!(device = %device, failed = report.failed, "telegram not delivered to every subscriber");
        }
    }

    async fn on_alarm(&mut self, tick: AlarmTick) {
        let subscribers = self.subscribers.lock().await;
        self.monitor.fire(tick, |alarm| {
            let event =
                DeviceEventMsg::inactivity_timeout(alarm.device.clone(), alarm.idle.as_secs_f64());
            let report = subscribers.publish(&alarm.device, &event);
            debug!(
                device = %alarm.device,
                delivered = report.delivered,
                "inactivity alarm published"
            );
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
