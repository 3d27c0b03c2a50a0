//! Reference-counted registry of media relay instances.
//!
//! The registry guarantees that, at any time, at most one engine instance
//! exists per media source and that it lives exactly as long as at least one
//! viewer session holds it.
//!
//! # Locking
//!
//! Each source has a slot (`Arc<tokio::sync::Mutex<RelaySlot>>`) in an arena
//! map.  Acquiring a source takes the slot lock and, if the slot has no
//! instance yet, creates and connects one while still holding it, so a second
//! viewer arriving during a slow connect waits for the first one to finish
//! and then shares its instance.  Releasing the last holder closes the
//! instance under the same lock and retires the slot; a viewer that was
//! waiting on a retired slot starts over with a fresh one and therefore a
//! fresh connect.
//!
//! The arena map lock and a slot lock are never held in the order
//! arena → slot, which keeps the two from deadlocking.

use std::collections::HashMap;
use std::sync::Arc;

use pdv_core::{QualityPreset, SessionDescription};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::application::media_engine::{EngineError, MediaEngineFactory, MediaRelayEngine};
use crate::domain::SessionId;

/// Identifies one viewer's hold on one source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaSessionKey {
    pub source_id: String,
    pub viewer: SessionId,
}

impl MediaSessionKey {
    pub fn new(source_id: impl Into<String>, viewer: SessionId) -> Self {
        Self {
            source_id: source_id.into(),
            viewer,
        }
    }
}

/// Errors from [`MediaSessionRegistry`].
#[derive(Debug, Error)]
pub enum MediaSessionError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("viewer {} already holds {}", .0.viewer, .0.source_id)]
    AlreadyActive(MediaSessionKey),

    #[error("viewer {} holds no session on {}", .0.viewer, .0.source_id)]
    UnknownSession(MediaSessionKey),
}

/// A viewer's handle for the offer/answer handshake.
///
/// Both calls go straight to the shared engine, addressed by the viewer.
#[derive(Clone)]
pub struct MediaHandshake {
    key: MediaSessionKey,
    preset: QualityPreset,
    engine: Arc<dyn MediaRelayEngine>,
}

impl MediaHandshake {
    pub fn key(&self) -> &MediaSessionKey {
        &self.key
    }

    /// The preset the shared instance actually runs at.
    pub fn preset(&self) -> QualityPreset {
        self.preset
    }

    pub async fn create_offer(&self) -> Result<SessionDescription, EngineError> {
        self.engine.create_offer(self.key.viewer).await
    }

    pub async fn process_answer(&self, answer: SessionDescription) -> Result<(), EngineError> {
        self.engine.process_answer(self.key.viewer, answer).await
    }
}

struct RelayInstance {
    engine: Arc<dyn MediaRelayEngine>,
    preset: QualityPreset,
    refcount: usize,
}

#[derive(Default)]
struct RelaySlot {
    instance: Option<RelayInstance>,
    retired: bool,
}

#[derive(Debug, Clone, Copy)]
struct SessionRecord {
    requested: QualityPreset,
    handshake_complete: bool,
}

/// Source id → shared relay instance, plus every viewer's hold on it.
pub struct MediaSessionRegistry {
    factory: Arc<dyn MediaEngineFactory>,
    slots: Mutex<HashMap<String, Arc<Mutex<RelaySlot>>>>,
    sessions: Mutex<HashMap<MediaSessionKey, SessionRecord>>,
}

impl MediaSessionRegistry {
    pub fn new(factory: Arc<dyn MediaEngineFactory>) -> Self {
        Self {
            factory,
            slots: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Gives `viewer` a hold on `source_id`, creating and connecting the
    /// instance if this is the source's first viewer.
    ///
    /// Unknown preset names fall back to the default preset.  If the source
    /// already has an instance, it is shared as-is and keeps the preset it
    /// was created with.
    ///
    /// # Errors
    ///
    /// A failed connect is returned to the caller; the half-built instance is
    /// closed and nothing is registered.
    pub async fn acquire(
        &self,
        source_id: &str,
        preset_name: &str,
        viewer: SessionId,
    ) -> Result<MediaHandshake, MediaSessionError> {
        let key = MediaSessionKey::new(source_id, viewer);
        if self.sessions.lock().await.contains_key(&key) {
            return Err(MediaSessionError::AlreadyActive(key));
        }

        let requested = match QualityPreset::lookup(preset_name) {
            Some(preset) => preset,
            None => {
                debug!(
                    preset = preset_name,
                    fallback = %QualityPreset::DEFAULT,
                    "unknown quality preset"
                );
                QualityPreset::DEFAULT
            }
        };

        loop {
            let slot = {
                let mut slots = self.slots.lock().await;
                Arc::clone(slots.entry(source_id.to_string()).or_default())
            };
            let mut guard = slot.lock().await;
            if guard.retired {
                // Closed while we waited; a fresh slot is (or will be) in
                // the arena.
                continue;
            }
            // A concurrent acquire for the same key may have registered
            // while we waited on the slot; sessions are inserted under it.
            if self.sessions.lock().await.contains_key(&key) {
                return Err(MediaSessionError::AlreadyActive(key));
            }

            let shared = guard.instance.as_mut().map(|instance| {
                instance.refcount += 1;
                if instance.preset != requested {
                    info!(
                        source = source_id,
                        running = %instance.preset,
                        requested = %requested,
                        "sharing running relay; requested preset not applied"
                    );
                }
                debug!(source = source_id, refcount = instance.refcount, "relay shared");
                (Arc::clone(&instance.engine), instance.preset)
            });

            let (engine, preset) = match shared {
                Some(shared) => shared,
                None => {
                    let engine = self.factory.create(source_id, requested);
                    if let Err(e) = engine.connect(source_id).await {
                        warn!(source = source_id, "relay connect failed: {e}");
                        engine.close().await;
                        guard.retired = true;
                        drop(guard);
                        self.remove_slot(source_id, &slot).await;
                        return Err(e.into());
                    }
                    info!(source = source_id, preset = %requested, "relay instance started");
                    guard.instance = Some(RelayInstance {
                        engine: Arc::clone(&engine),
                        preset: requested,
                        refcount: 1,
                    });
                    (engine, requested)
                }
            };

            self.sessions.lock().await.insert(
                key.clone(),
                SessionRecord {
                    requested,
                    handshake_complete: false,
                },
            );
            return Ok(MediaHandshake {
                key,
                preset,
                engine,
            });
        }
    }

    /// Drops the viewer's hold.  The last holder's release closes the
    /// instance.  Releasing a key that is not held is a no-op; returns
    /// whether a hold was released.
    pub async fn release(&self, key: &MediaSessionKey) -> bool {
        if self.sessions.lock().await.remove(key).is_none() {
            return false;
        }

        let Some(slot) = self.slots.lock().await.get(&key.source_id).cloned() else {
            warn!(source = %key.source_id, "released session had no relay slot");
            return true;
        };

        let mut guard = slot.lock().await;
        let closing = match guard.instance.as_mut() {
            Some(instance) => {
                instance.engine.detach(key.viewer).await;
                instance.refcount = instance.refcount.saturating_sub(1);
                debug!(source = %key.source_id, refcount = instance.refcount, "relay released");
                instance.refcount == 0
            }
            None => false,
        };

        if closing {
            if let Some(instance) = guard.instance.take() {
                instance.engine.close().await;
                info!(source = %key.source_id, "relay instance closed");
            }
            guard.retired = true;
            drop(guard);
            self.remove_slot(&key.source_id, &slot).await;
        }
        true
    }

    /// Moves a viewer to a new preset: its hold is released, then a new one
    /// is acquired for the same source.  The caller must run a fresh
    /// handshake on the returned handle.
    pub async fn change_quality(
        &self,
        key: &MediaSessionKey,
        preset_name: &str,
    ) -> Result<MediaHandshake, MediaSessionError> {
        if !self.release(key).await {
            return Err(MediaSessionError::UnknownSession(key.clone()));
        }
        self.acquire(&key.source_id, preset_name, key.viewer).await
    }

    /// Records that the viewer's answer has been applied.
    pub async fn mark_handshake_complete(&self, key: &MediaSessionKey) {
        if let Some(record) = self.sessions.lock().await.get_mut(key) {
            record.handshake_complete = true;
        }
    }

    pub async fn is_handshake_complete(&self, key: &MediaSessionKey) -> bool {
        self.sessions
            .lock()
            .await
            .get(key)
            .map_or(false, |r| r.handshake_complete)
    }

    /// The preset the viewer asked for (which may differ from the preset a
    /// shared instance runs at).
    pub async fn requested_preset(&self, key: &MediaSessionKey) -> Option<QualityPreset> {
        self.sessions.lock().await.get(key).map(|r| r.requested)
    }

    /// Number of holders of `source_id`'s instance; 0 if it has none.
    pub async fn refcount(&self, source_id: &str) -> usize {
        let Some(slot) = self.slots.lock().await.get(source_id).cloned() else {
            return 0;
        };
        let guard = slot.lock().await;
        guard.instance.as_ref().map_or(0, |i| i.refcount)
    }

    /// Number of live instances.
    pub async fn instance_count(&self) -> usize {
        let slots: Vec<_> = self.slots.lock().await.values().cloned().collect();
        let mut live = 0;
        for slot in slots {
            if slot.lock().await.instance.is_some() {
                live += 1;
            }
        }
        live
    }

    /// Number of viewer holds across all sources.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Removes `slot` from the arena if it is still the registered one.
    async fn remove_slot(&self, source_id: &str, slot: &Arc<Mutex<RelaySlot>>) {
        let mut slots = self.slots.lock().await;
        if slots.get(source_id).map_or(false, |s| Arc::ptr_eq(s, slot)) {
            slots.remove(source_id);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
