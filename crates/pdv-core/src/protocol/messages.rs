//! JSON message types for the two browser-facing channels.
//!
//! The gateway serves two independently addressed WebSocket endpoints:
//!
//! # Device-registration channel
//!
//! ```text
//! Browser → Gateway:  {"command":"register","pdv_ip":"192.168.0.21"}
//! Gateway → Browser:  {"type":"register_response","success":true,"pdv_ip":"192.168.0.21"}
//! Gateway → Browser:  {"type":"pdv_data","pdv_ip":"192.168.0.21","data":"..."}
//! Gateway → Browser:  {"type":"pdv_inativo_timeout","pdv_ip":"192.168.0.21","inactive_time":180.3}
//! ```
//!
//! # Media-viewing channel
//!
//! ```text
//! Browser → Gateway:  rtsp://camera-1/stream          (source id, plain text)
//! Browser → Gateway:  {"quality":"high"}               (optional)
//! Gateway → Browser:  {"sdp":"v=0...","type":"offer"}
//! Browser → Gateway:  {"sdp":"v=0...","type":"answer"}
//! Browser → Gateway:  {"change_quality":"low"}         (fresh offer/answer follows)
//! Browser → Gateway:  CLOSE                            (plain text)
//! ```
//!
//! Field names (`pdv_ip`, `inactive_time`, `pdv_inativo_timeout`) are kept
//! exactly as the deployed web clients expect them.

use serde::{Deserialize, Serialize};

use crate::domain::device::DeviceId;

/// Literal text a viewer sends to end its session.
pub const CLOSE_COMMAND: &str = "CLOSE";

// ── Device-registration channel ───────────────────────────────────────────────

/// Commands a browser sends on the device-registration channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DeviceCommand {
    /// Subscribe this channel to the telegrams and alarms of one PDV.
    Register {
        /// The PDV to subscribe to.  Absent or empty registrations are
        /// answered with `success: false`.
        #[serde(default)]
        pdv_ip: Option<String>,
    },
}

/// Messages the gateway pushes on the device-registration channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceEventMsg {
    /// Answer to a [`DeviceCommand::Register`].
    RegisterResponse {
        success: bool,
        pdv_ip: Option<String>,
    },

    /// One telegram received from the PDV.
    PdvData {
        pdv_ip: DeviceId,
        /// The telegram text (UTF-8, invalid bytes dropped).
        data: String,
    },

    /// The PDV stayed inside an open sale for longer than the configured
    /// inactivity timeout.
    #[serde(rename = "pdv_inativo_timeout")]
    InactivityTimeout {
        pdv_ip: DeviceId,
        /// Seconds since the last activity, rounded to one decimal place.
        inactive_time: f64,
    },
}

impl DeviceEventMsg {
    /// Builds an inactivity alarm, rounding the idle time to 0.1 s.
    pub fn inactivity_timeout(pdv_ip: DeviceId, idle_secs: f64) -> Self {
        Self::InactivityTimeout {
            pdv_ip,
            inactive_time: (idle_secs * 10.0).round() / 10.0,
        }
    }

    /// The device this message concerns, if any.
    pub fn device(&self) -> Option<&str> {
        match self {
            Self::RegisterResponse { pdv_ip, .. } => pdv_ip.as_deref(),
            Self::PdvData { pdv_ip, .. } | Self::InactivityTimeout { pdv_ip, .. } => Some(pdv_ip),
        }
    }
}

// ── Media-viewing channel ─────────────────────────────────────────────────────

/// SDP message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// An opaque session description exchanged during the media handshake.
///
/// The gateway never looks inside `sdp`; it passes the text between the
/// browser and the media relay engine verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: SdpType,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            kind: SdpType::Offer,
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            kind: SdpType::Answer,
        }
    }
}

/// A control message received on the media-viewing channel after the
/// handshake (or as the optional quality follow-up before it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerControl {
    /// The literal `CLOSE`.
    Close,
    /// `{"change_quality": name}`: renegotiate with a new preset.
    ChangeQuality(String),
    /// `{"quality": name}`: initial preset choice.
    Quality(String),
    /// Anything else; ignored by the session driver.
    Unrecognized,
}

#[derive(Deserialize)]
struct ViewerRequestJson {
    #[serde(default)]
    change_quality: Option<String>,
    #[serde(default)]
    quality: Option<String>,
}

impl ViewerControl {
    /// Parses one text frame.  Never fails; unknown input is
    /// [`ViewerControl::Unrecognized`].
    pub fn parse(text: &str) -> Self {
        if text == CLOSE_COMMAND {
            return Self::Close;
        }
        match serde_json::from_str::<ViewerRequestJson>(text) {
            Ok(ViewerRequestJson {
                change_quality: Some(name),
                ..
            }) => Self::ChangeQuality(name),
            Ok(ViewerRequestJson {
                quality: Some(name),
                ..
            }) => Self::Quality(name),
            _ => Self::Unrecognized,
        }
    }
}

/// Out-of-band notices the gateway sends on the media-viewing channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerNotice {
    /// The session could not be established or renegotiated and is closing.
    Error { message: String },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
