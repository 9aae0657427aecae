//! Frame layout, command codes, and payload types.
//!
//! Wire format:
//! ```text
//! [prefix:4 = 0x000055AA][seq:4][command:4][payload_len:4][payload:N][suffix:4 = 0x0000AA55]
//! ```
//! All integers are big-endian.  Payloads are UTF-8 JSON.
//!
//! This is a simplified framing for the onboarding handshake.  It reuses the
//! 55AA/AA55 markers and the 6666/6668 ports of common Wi-Fi plugs but has no
//! CRC, no AES payload encryption, and authenticates queries with an HMAC
//! signature, so commercial plugs do not speak it as-is.  Devices (or a
//! bridge in front of them) must implement this exact framing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Magic value opening every frame.
pub const FRAME_PREFIX: u32 = 0x0000_55AA;

/// Magic value closing every frame.
pub const FRAME_SUFFIX: u32 = 0x0000_AA55;

/// Size of the fixed frame header (prefix + seq + command + payload_len).
pub const HEADER_SIZE: usize = 16;

/// Size of the frame trailer (suffix).
pub const TRAILER_SIZE: usize = 4;

/// Largest payload a frame may carry.
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024;

/// Frame command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Command {
    /// Status request from host to plug; the plug replies with the same code.
    StatusQuery = 0x0A,
    /// Periodic UDP broadcast by a plug announcing itself.
    Announce = 0x13,
}

impl TryFrom<u32> for Command {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x0A => Ok(Self::StatusQuery),
            0x13 => Ok(Self::Announce),
            other => Err(other),
        }
    }
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sequence: u32,
    pub command: Command,
    pub payload: Vec<u8>,
}

/// Signed status request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusQuery {
    #[serde(rename = "gwId")]
    pub gw_id: String,
    #[serde(rename = "devId")]
    pub dev_id: String,
    pub uid: String,
    /// Unix time in seconds, covered by the signature.
    pub t: u64,
    /// Hex HMAC-SHA256 over `"{devId}|{t}"` keyed with the local key.
    pub sig: String,
}

/// Status reply payload.
///
/// A plug either reports its data points (`dps`) or an error (`Error`,
/// optionally with a numeric-ish `Err` code).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusReply {
    #[serde(rename = "devId", default, skip_serializing_if = "Option::is_none")]
    pub dev_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dps: Option<Map<String, Value>>,
    #[serde(rename = "Error", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "Err", default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<Value>,
    /// Any other fields the device sent.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl StatusReply {
    /// Builds a reply carrying data points.
    pub fn status(dev_id: impl Into<String>, dps: Map<String, Value>) -> Self {
        Self {
            dev_id: Some(dev_id.into()),
            dps: Some(dps),
            ..Self::default()
        }
    }

    /// Builds an error reply.
    pub fn error(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            error_code: Some(Value::String(code.into())),
            ..Self::default()
        }
    }
}
