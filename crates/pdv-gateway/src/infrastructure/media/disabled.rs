//! Engine used when the binary has no video backend configured.
//!
//! Every viewer that asks for a relay receives an error notice and is
//! disconnected; the device channel and the UDP relay are unaffected.

use std::sync::Arc;

use async_trait::async_trait;
use pdv_core::{QualityPreset, SessionDescription};

use crate::application::media_engine::{EngineError, MediaEngineFactory, MediaRelayEngine};
use crate::domain::SessionId;

const REASON: &str = "no video backend is configured on this gateway";

pub struct DisabledEngine;

#[async_trait]
impl MediaRelayEngine for DisabledEngine {
    async fn connect(&self, _source_id: &str) -> Result<(), EngineError> {
        Err(EngineError::Unavailable(REASON.to_string()))
    }

    async fn create_offer(&self, _viewer: SessionId) -> Result<SessionDescription, EngineError> {
        Err(EngineError::NotConnected)
    }

    async fn process_answer(
        &self,
        _viewer: SessionId,
        _answer: SessionDescription,
    ) -> Result<(), EngineError> {
        Err(EngineError::NotConnected)
    }

    async fn detach(&self, _viewer: SessionId) {}

    async fn close(&self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledEngineFactory;

impl MediaEngineFactory for DisabledEngineFactory {
    fn create(&self, _source_id: &str, _preset: QualityPreset) -> Arc<dyn MediaRelayEngine> {
        Arc::new(DisabledEngine)
    }
}
