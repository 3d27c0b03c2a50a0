//! Subscriber and viewer registries.
//!
//! [`SubscriberRegistry`] maps each device to the set of browser sessions
//! registered for it and delivers telegrams and alarms to them.
//! [`ViewerRegistry`] records which media source every live viewer watches
//! and at which quality.
//!
//! Both are plain data structures; the gateway wraps them in
//! `Arc<tokio::sync::Mutex<_>>` so session tasks and the device pump can
//! share them.

use std::collections::HashMap;

use pdv_core::{DeviceEventMsg, DeviceId, QualityPreset};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::domain::SessionId;

// ── Device subscribers ────────────────────────────────────────────────────────

/// Delivery endpoint of one registered session.
///
/// Each device-registration session owns the receiving half of a bounded
/// queue and drains it onto its channel, so a slow browser only ever delays
/// itself.
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    id: SessionId,
    tx: mpsc::Sender<DeviceEventMsg>,
}

impl SubscriberHandle {
    pub fn new(id: SessionId, tx: mpsc::Sender<DeviceEventMsg>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }
}

/// Outcome of one [`SubscriberRegistry::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Device id → sessions subscribed to it.
///
/// A device with no subscribers has no entry.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    sets: HashMap<DeviceId, HashMap<SessionId, SubscriberHandle>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `handle` to the device's set.  Registering the same session for
    /// the same device twice is a no-op; returns whether it was added.
    pub fn subscribe(&mut self, device: &str, handle: SubscriberHandle) -> bool {
        let set = self.sets.entry(device.to_string()).or_default();
        if set.contains_key(&handle.id) {
            return false;
        }
        debug!(device, session = %handle.id, "session subscribed");
        set.insert(handle.id, handle);
        true
    }

    /// Removes the session from every device set it belongs to and returns
    /// those devices.  Sets left empty are deleted.
    pub fn unsubscribe(&mut self, session: SessionId) -> Vec<DeviceId> {
        let mut removed = Vec::new();
        self.sets.retain(|device, set| {
            if set.remove(&session).is_some() {
                removed.push(device.clone());
            }
            !set.is_empty()
        });
        if !removed.is_empty() {
            debug!(%session, devices = removed.len(), "session unsubscribed");
        }
        removed
    }

    /// Delivers `event` to every subscriber of `device`.
    ///
    /// Delivery is non-blocking.  A subscriber whose queue is full or whose
    /// session is already gone is counted as failed and skipped; the others
    /// still receive the event.
    pub fn publish(&self, device: &str, event: &DeviceEventMsg) -> PublishReport {
        let mut report = PublishReport::default();
        let Some(set) = self.sets.get(device) else {
            return report;
        };

        for handle in set.values() {
            match handle.tx.try_send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    report.failed += 1;
                    warn!(device, session = %handle.id, "subscriber queue full; event dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    report.failed += 1;
                    debug!(device, session = %handle.id, "subscriber already gone");
                }
            }
        }
        report
    }

    /// Number of sessions subscribed to `device`.
    pub fn subscriber_count(&self, device: &str) -> usize {
        self.sets.get(device).map_or(0, HashMap::len)
    }

    /// Number of devices with at least one subscriber.
    pub fn device_count(&self) -> usize {
        self.sets.len()
    }

    pub fn is_subscribed(&self, device: &str, session: SessionId) -> bool {
        self.sets
            .get(device)
            .map_or(false, |set| set.contains_key(&session))
    }
}

// ── Live viewers ──────────────────────────────────────────────────────────────

/// What one viewer is watching.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerInfo {
    pub source_id: String,
    pub quality: QualityPreset,
}

/// Session id → watched source, plus a per-source viewer count.
#[derive(Debug, Default)]
pub struct ViewerRegistry {
    viewers: HashMap<SessionId, ViewerInfo>,
    per_source: HashMap<String, usize>,
}

impl ViewerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a viewer and returns how many viewers the source now has.
    /// A session that joins twice is moved to the new source.
    pub fn join(&mut self, session: SessionId, source_id: &str, quality: QualityPreset) -> usize {
        self.leave(session);
        self.viewers.insert(
            session,
            ViewerInfo {
                source_id: source_id.to_string(),
                quality,
            },
        );
        let count = self.per_source.entry(source_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Updates the quality a viewer watches at.
    pub fn set_quality(&mut self, session: SessionId, quality: QualityPreset) {
        if let Some(info) = self.viewers.get_mut(&session) {
            info.quality = quality;
        }
    }

    /// Removes a viewer.  Returns the source it watched and the remaining
    /// viewer count for that source; `None` if the session was not watching.
    pub fn leave(&mut self, session: SessionId) -> Option<(String, usize)> {
        let info = self.viewers.remove(&session)?;
        let remaining = match self.per_source.get_mut(&info.source_id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                *count
            }
            _ => {
                self.per_source.remove(&info.source_id);
                0
            }
        };
        Some((info.source_id, remaining))
    }

    pub fn get(&self, session: SessionId) -> Option<&ViewerInfo> {
        self.viewers.get(&session)
    }

    /// Number of live viewers of `source_id`.
    pub fn viewers_of(&self, source_id: &str) -> usize {
        self.per_source.get(source_id).copied().unwrap_or(0)
    }

    /// Total live viewers.
    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::new_session_id;

    const DEVICE: &str = "192.168.0.21";

    fn handle(capacity: usize) -> (SubscriberHandle, mpsc::Receiver<DeviceEventMsg>) {
        let (tx, rx) = mpsc::channel(capacity);
        (SubscriberHandle::new(new_session_id(), tx), rx)
    }

    fn data(text: &str) -> DeviceEventMsg {
        DeviceEventMsg::PdvData {
            pdv_ip: DEVICE.to_string(),
            data: text.to_string(),
        }
    }

    #[test]
    fn test_publish_reaches_every_subscriber() {
        // Arrange
        let mut reg = SubscriberRegistry::new();
        let (a, mut rx_a) = handle(8);
        let (b, mut rx_b) = handle(8);
        reg.subscribe(DEVICE, a);
        reg.subscribe(DEVICE, b);

        // Act
        let report = reg.publish(DEVICE, &data("Item 1"));

        // Assert
        assert_eq!(report, PublishReport { delivered: 2, failed: 0 });
        assert_eq!(rx_a.try_recv().unwrap(), data("Item 1"));
        assert_eq!(rx_b.try_recv().unwrap(), data("Item 1"));
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let reg = SubscriberRegistry::new();
        assert_eq!(reg.publish(DEVICE, &data("x")), PublishReport::default());
    }

    #[test]
    fn test_dead_subscriber_does_not_block_others() {
        // Arrange
        let mut reg = SubscriberRegistry::new();
        let (dead, rx_dead) = handle(8);
        let (live, mut rx_live) = handle(8);
        reg.subscribe(DEVICE, dead);
        reg.subscribe(DEVICE, live);
        drop(rx_dead);

        // Act
        let report = reg.publish(DEVICE, &data("Item 2"));

        // Assert
        assert_eq!(report, PublishReport { delivered: 1, failed: 1 });
        assert_eq!(rx_live.try_recv().unwrap(), data("Item 2"));
    }

    #[test]
    fn test_full_queue_drops_event_for_that_subscriber_only() {
        let mut reg = SubscriberRegistry::new();
        let (slow, _rx_slow) = handle(1);
        let (fast, mut rx_fast) = handle(8);
        reg.subscribe(DEVICE, slow);
        reg.subscribe(DEVICE, fast);

        reg.publish(DEVICE, &data("1"));
        let report = reg.publish(DEVICE, &data("2"));

        assert_eq!(report, PublishReport { delivered: 1, failed: 1 });
        assert_eq!(rx_fast.try_recv().unwrap(), data("1"));
        assert_eq!(rx_fast.try_recv().unwrap(), data("2"));
    }

    #[test]
    fn test_duplicate_subscribe_is_idempotent() {
        let mut reg = SubscriberRegistry::new();
        let (h, mut rx) = handle(8);
        assert!(reg.subscribe(DEVICE, h.clone()));
        assert!(!reg.subscribe(DEVICE, h));

        reg.publish(DEVICE, &data("x"));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unsubscribe_removes_session_from_all_devices() {
        // Arrange
        let mut reg = SubscriberRegistry::new();
        let (h, _rx) = handle(8);
        let id = h.id();
        let (other, _rx_other) = handle(8);
        reg.subscribe("10.0.0.1", h.clone());
        reg.subscribe("10.0.0.2", h);
        reg.subscribe("10.0.0.2", other);

        // Act
        let mut removed = reg.unsubscribe(id);
        removed.sort();

        // Assert
        assert_eq!(removed, vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]);
        assert_eq!(reg.subscriber_count("10.0.0.1"), 0);
        assert_eq!(reg.subscriber_count("10.0.0.2"), 1);
        // The emptied set is gone entirely.
        assert_eq!(reg.device_count(), 1);
    }

    #[test]
    fn test_unsubscribe_unknown_session_is_noop() {
        let mut reg = SubscriberRegistry::new();
        assert!(reg.unsubscribe(new_session_id()).is_empty());
        assert!(reg.unsubscribe(new_session_id()).is_empty());
    }

    #[test]
    fn test_viewer_counts_follow_join_and_leave() {
        // Arrange
        let mut viewers = ViewerRegistry::new();
        let a = new_session_id();
        let b = new_session_id();

        // Act / Assert
        assert_eq!(viewers.join(a, "rtsp://cam1", QualityPreset::DEFAULT), 1);
        assert_eq!(viewers.join(b, "rtsp://cam1", QualityPreset::HIGH), 2);
        assert_eq!(viewers.leave(a), Some(("rtsp://cam1".to_string(), 1)));
        assert_eq!(viewers.leave(a), None);
        assert_eq!(viewers.leave(b), Some(("rtsp://cam1".to_string(), 0)));
        assert_eq!(viewers.viewers_of("rtsp://cam1"), 0);
        assert!(viewers.is_empty());
    }

    #[test]
    fn test_set_quality_updates_viewer() {
        let mut viewers = ViewerRegistry::new();
        let a = new_session_id();
        viewers.join(a, "cam", QualityPreset::DEFAULT);
        viewers.set_quality(a, QualityPreset::LOW);
        assert_eq!(viewers.get(a).unwrap().quality, QualityPreset::LOW);
    }

    #[test]
    fn test_rejoin_moves_viewer_to_new_source() {
        let mut viewers = ViewerRegistry::new();
        let a = new_session_id();
        viewers.join(a, "cam1", QualityPreset::DEFAULT);
        viewers.join(a, "cam2", QualityPreset::DEFAULT);
        assert_eq!(viewers.viewers_of("cam1"), 0);
        assert_eq!(viewers.viewers_of("cam2"), 1);
        assert_eq!(viewers.len(), 1);
    }
}
