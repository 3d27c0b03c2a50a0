//! Device-registration session driver.
//!
//! One browser channel, many possible device subscriptions:
//!
//! ```text
//! browser ──{"command":"register","pdv_ip":…}──► subscribe, answer register_response
//! gateway ──pdv_data / pdv_inativo_timeout─────► browser
//! ```
//!
//! Events for the session arrive on a bounded queue fed by
//! [`SubscriberRegistry::publish`]; the driver drains that queue onto the
//! channel while also waiting for commands.  When the channel closes or
//! fails, the session is removed from every device it registered for.

use std::sync::Arc;

use pdv_core::{DeviceCommand, DeviceEventMsg};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::application::channel::{ChannelError, MessageChannel};
use crate::application::fanout::{SubscriberHandle, SubscriberRegistry};
use crate::domain::SessionId;

/// Events buffered per session before new ones are dropped.
pub const SESSION_EVENT_BUFFER: usize = 256;

/// Runs one device-registration session to completion.
///
/// Cleanup runs exactly once, whatever ends the session: a clean close, a
/// transport error, or the task being dropped.
pub async fn run_device_session<C: MessageChannel>(
    channel: &mut C,
    session: SessionId,
    subscribers: Arc<Mutex<SubscriberRegistry>>,
) -> Result<(), ChannelError> {
    let mut teardown = DeviceTeardown::new(session, Arc::clone(&subscribers));
    let (tx, mut events) = mpsc::channel(SESSION_EVENT_BUFFER);
    let handle = SubscriberHandle::new(session, tx);

    let result = drive(channel, &handle, &mut events, &subscribers).await;
    teardown.run().await;
    result
}

async fn drive<C: MessageChannel>(
    channel: &mut C,
    handle: &SubscriberHandle,
    events: &mut mpsc::Receiver<DeviceEventMsg>,
    subscribers: &Mutex<SubscriberRegistry>,
) -> Result<(), ChannelError> {
    loop {
        tokio::select! {
            inbound = channel.recv() => match inbound? {
                Some(text) => {
                    if let Some(reply) = handle_command(&text, handle, subscribers).await {
                        send_event(channel, &reply).await?;
                    }
                }
                None => return Ok(()),
            },
            Some(event) = events.recv() => send_event(channel, &event).await?,
        }
    }
}

/// Applies one inbound command; returns the reply to send, if any.
async fn handle_command(
    text: &str,
    handle: &SubscriberHandle,
    subscribers: &Mutex<SubscriberRegistry>,
) -> Option<DeviceEventMsg> {
    let command = match serde_json::from_str::<DeviceCommand>(text) {
        Ok(command) => command,
        Err(e) => {
            warn!(session = %handle.id(), "ignoring invalid command: {e}");
            return None;
        }
    };

    match command {
        DeviceCommand::Register { pdv_ip } => {
            let device = pdv_ip.filter(|ip| !ip.trim().is_empty());
            let success = match &device {
                Some(device) => {
                    subscribers.lock().await.subscribe(device, handle.clone());
                    info!(session = %handle.id(), device = %device, "browser registered for device");
                    true
                }
                None => {
                    debug!(session = %handle.id(), "register without pdv_ip");
                    false
                }
            };
            Some(DeviceEventMsg::RegisterResponse {
                success,
                pdv_ip: device,
            })
        }
    }
}

async fn send_event<C: MessageChannel>(
    channel: &mut C,
    event: &DeviceEventMsg,
) -> Result<(), ChannelError> {
    match serde_json::to_string(event) {
        Ok(json) => channel.send(json).await,
        Err(e) => {
            warn!("failed to serialise device event: {e}");
            Ok(())
        }
    }
}

/// Removes a session from every subscriber set, exactly once.
struct DeviceTeardown {
    session: SessionId,
    subscribers: Arc<Mutex<SubscriberRegistry>>,
    done: bool,
}

impl DeviceTeardown {
    fn new(session: SessionId, subscribers: Arc<Mutex<SubscriberRegistry>>) -> Self {
        Self {
            session,
            subscribers,
            done: false,
        }
    }

    async fn run(&mut self) {
        if std::mem::replace(&mut self.done, true) {
            return;
        }
        let removed = self.subscribers.lock().await.unsubscribe(self.session);
        debug!(session = %self.session, devices = removed.len(), "device session torn down");
    }
}

impl Drop for DeviceTeardown {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        // The session task was cancelled mid-await; finish cleanup on the
        // runtime if it is still alive.
        let session = self.session;
        let subscribers = Arc::clone(&self.subscribers);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                subscribers.lock().await.unsubscribe(session);
            });
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
