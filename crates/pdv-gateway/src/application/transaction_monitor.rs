//! Per-device sale state machine with inactivity timers.
//!
//! Each device is either idle or inside a sale:
//!
//! ```text
//!            Start                        End
//!   IDLE ───────────────► IN_TRANSACTION ─────► IDLE
//!     ▲                     │   ▲  │
//!     │       timeout       │   │  │ Start / Activity
//!     └─────────────────────┘   └──┘ (re-arm timer)
//! ```
//!
//! While a sale is open the device has exactly one pending timer.  Every
//! start or activity telegram cancels it and arms a fresh one; an end
//! telegram cancels it.  When a timer fires the subscribers are alarmed and
//! the device drops back to idle.  Telegrams that arrive while idle, other
//! than a start, are ignored.
//!
//! Only devices with an open sale are tracked; an idle device has no entry.
//! Senders that never open a sale (stray UDP on a shared port) leave no
//! state behind.
//!
//! # Timers and ordering
//!
//! Timers are tokio tasks that sleep for the timeout and then post an
//! [`AlarmTick`] to the channel the device pump reads.  The monitor itself
//! is owned by that single pump task, so telegram handling and timer expiry
//! never race: whichever reaches the pump first is applied first.  Every
//! armed timer carries a generation number; a tick whose generation no longer
//! matches the device's pending timer was superseded and is dropped.
//!
//! Time is read from `tokio::time::Instant`, so tests can run the whole
//! state machine on a paused clock.

use std::collections::HashMap;
use std::time::Duration;

use pdv_core::{DeviceId, MarkerClassifier, TelegramClassifier, TelegramKind};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Posted by a timer task when its sleep completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmTick {
    pub device: DeviceId,
    pub generation: u64,
}

/// An inactivity alarm that must be delivered to the device's subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InactivityAlarm {
    pub device: DeviceId,
    /// Time elapsed since the last start or activity telegram.
    pub idle: Duration,
}

/// Observable state of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    InTransaction,
}

struct PendingTimer {
    generation: u64,
    task: JoinHandle<()>,
}

/// An open sale.
struct DeviceState {
    last_activity: Instant,
    pending: Option<PendingTimer>,
}

impl DeviceState {
    fn new(now: Instant) -> Self {
        Self {
            last_activity: now,
            pending: None,
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.pending.take() {
            timer.task.abort();
        }
    }
}

/// Tracks every device's sale state and owns its inactivity timer.
pub struct TransactionMonitor<C = MarkerClassifier> {
    classifier: C,
    timeout: Duration,
    devices: HashMap<DeviceId, DeviceState>,
    alarm_tx: UnboundedSender<AlarmTick>,
    next_generation: u64,
}

impl TransactionMonitor<MarkerClassifier> {
    /// Creates a monitor using the marker-substring classifier.
    pub fn new(timeout: Duration, alarm_tx: UnboundedSender<AlarmTick>) -> Self {
        Self::with_classifier(MarkerClassifier::new(), timeout, alarm_tx)
    }
}

impl<C: TelegramClassifier> TransactionMonitor<C> {
    /// Creates a monitor with a custom classifier.
    pub fn with_classifier(
        classifier: C,
        timeout: Duration,
        alarm_tx: UnboundedSender<AlarmTick>,
    ) -> Self {
        Self {
            classifier,
            timeout,
            devices: HashMap::new(),
            alarm_tx,
            next_generation: 0,
        }
    }

    /// The configured inactivity timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Applies one telegram to the device's state and returns its
    /// classification.
    pub fn observe(&mut self, device: &str, telegram: &str) -> TelegramKind {
        let kind = self.classifier.classify(telegram);
        let now = Instant::now();

        match kind {
            TelegramKind::Start => {
                match self.devices.get_mut(device) {
                    Some(state) => {
                        debug!(device, "sale restarted before the previous one ended");
                        state.last_activity = now;
                    }
                    None => {
                        info!(device, "sale started");
                        self.devices.insert(device.to_string(), DeviceState::new(now));
                    }
                }
                self.arm_timer(device);
            }
            TelegramKind::End => {
                if let Some(mut state) = self.devices.remove(device) {
                    state.cancel_timer();
                    info!(device, "sale finished");
                }
            }
            TelegramKind::Activity => {
                if let Some(state) = self.devices.get_mut(device) {
                    state.last_activity = now;
                    self.arm_timer(device);
                }
            }
            TelegramKind::Other => {}
        }

        kind
    }

    /// Handles a timer tick.
    ///
    /// When the tick belongs to the device's current timer, the device
    /// returns to idle, `notify` is called with the alarm, and the alarm is
    /// returned.  Superseded ticks return `None` and call nothing.
    pub fn fire<F>(&mut self, tick: AlarmTick, notify: F) -> Option<InactivityAlarm>
    where
        F: FnOnce(&InactivityAlarm),
    {
        let state = self.devices.get_mut(&tick.device)?;

        let current = state
            .pending
            .as_ref()
            .map_or(false, |timer| timer.generation == tick.generation);
        if !current {
            debug!(
                device = %tick.device,
                generation = tick.generation,
                "ignoring superseded inactivity timer"
            );
            return None;
        }

        let idle = state.last_activity.elapsed();
        self.devices.remove(&tick.device);
        let alarm = InactivityAlarm {
            device: tick.device,
            idle,
        };

        info!(
            device = %alarm.device,
            idle_secs = alarm.idle.as_secs_f64(),
            "sale inactive past timeout"
        );
        notify(&alarm);
        Some(alarm)
    }

    /// Current state of a device.
    pub fn state(&self, device: &str) -> TransactionState {
        if self.devices.contains_key(device) {
            TransactionState::InTransaction
        } else {
            TransactionState::Idle
        }
    }

    /// Whether the device has an armed timer.
    pub fn has_pending_timer(&self, device: &str) -> bool {
        self.devices
            .get(device)
            .map_or(false, |s| s.pending.is_some())
    }

    /// Number of armed timers across all devices.
    pub fn pending_timers(&self) -> usize {
        self.devices.values().filter(|s| s.pending.is_some()).count()
    }

    /// Number of devices with an open sale.
    pub fn tracked_devices(&self) -> usize {
        self.devices.len()
    }

    /// Cancels the device's pending timer, if any, and arms a new one.
    fn arm_timer(&mut self, device: &str) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let deadline = Instant::now() + self.timeout;
        let tx = self.alarm_tx.clone();
        let tick = AlarmTick {
            device: device.to_string(),
            generation,
        };

        let Some(state) = self.devices.get_mut(device) else {
            return;
        };
        state.cancel_timer();

        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            // The pump may already be gone during shutdown.
            let _ = tx.send(tick);
        });
        state.pending = Some(PendingTimer { generation, task });
    }
}

impl<C> Drop for TransactionMonitor<C> {
    fn drop(&mut self) {
        for state in self.devices.values_mut() {
            state.cancel_timer();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
